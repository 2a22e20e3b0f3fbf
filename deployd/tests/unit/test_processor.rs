//! Queue processor tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use deployd::errors::DeployError;
use deployd::queue::memory::MemoryJobQueue;
use deployd::queue::processor::{self, AdmissionFn, ProcessFn, Tick};
use deployd::queue::{JobQueue, QueueItem};

#[tokio::test]
async fn test_failing_items_do_not_stop_the_loop() {
    let queue: Arc<dyn JobQueue<String>> = Arc::new(MemoryJobQueue::new("jobs"));
    for key in ["a", "b", "c"] {
        queue.enqueue(key, key.to_uppercase()).await.unwrap();
    }

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let process_fn: ProcessFn<String> = Arc::new(move |item: QueueItem<String>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if item.key == "b" {
                return Err(DeployError::PlatformError("boom".to_string()));
            }
            Ok(())
        }
        .boxed()
    });

    let shutdown = CancellationToken::new();
    let options = processor::Options {
        poll_interval: Duration::from_millis(5),
        ..Default::default()
    };
    let handle = {
        let queue = queue.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            processor::run(
                &options,
                queue,
                process_fn,
                None,
                tokio::time::sleep,
                Box::pin(token.cancelled_owned()),
            )
            .await;
        })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while seen.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("items were not processed");

    shutdown.cancel();
    handle.await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_requeued_items_wait_for_next_tick() {
    let queue: Arc<dyn JobQueue<u32>> = Arc::new(MemoryJobQueue::new("dependents"));
    queue.enqueue("waiting", 1).await.unwrap();

    let requeue = queue.clone();
    let process_fn: ProcessFn<u32> = Arc::new(move |item: QueueItem<u32>| {
        let queue = requeue.clone();
        async move { queue.enqueue(&item.key, item.payload + 1).await }.boxed()
    });

    let options = processor::Options::default();
    let result = processor::tick(&options, queue.as_ref(), &process_fn, None).await;
    assert_eq!(result, Tick::Processed(1));

    let items = queue.get_all().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key, "waiting");
    assert_eq!(items[0].payload, 2);
}

#[tokio::test]
async fn test_admission_is_checked_before_each_item() {
    let queue: Arc<dyn JobQueue<u32>> = Arc::new(MemoryJobQueue::new("deployments"));
    for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
        queue.enqueue(key, i as u32).await.unwrap();
    }

    // Each processed item becomes an active workload
    let active = Arc::new(AtomicUsize::new(0));
    let started = active.clone();
    let process_fn: ProcessFn<u32> = Arc::new(move |_item: QueueItem<u32>| {
        let started = started.clone();
        async move {
            started.fetch_add(1, Ordering::SeqCst);
            Ok::<(), DeployError>(())
        }
        .boxed()
    });
    let observed = active.clone();
    let admission_fn: AdmissionFn = Arc::new(move || {
        let observed = observed.clone();
        async move { Ok::<usize, DeployError>(observed.load(Ordering::SeqCst)) }.boxed()
    });

    let options = processor::Options {
        max_active_workloads: 2,
        ..Default::default()
    };
    let result = processor::tick(&options, queue.as_ref(), &process_fn, Some(&admission_fn)).await;
    assert_eq!(result, Tick::Processed(2));
    assert_eq!(queue.len().await.unwrap(), 1);

    let result = processor::tick(&options, queue.as_ref(), &process_fn, Some(&admission_fn)).await;
    assert_eq!(result, Tick::Deferred);
}

#[tokio::test]
async fn test_admission_errors_defer_processing() {
    let queue: Arc<dyn JobQueue<u32>> = Arc::new(MemoryJobQueue::new("deployments"));
    queue.enqueue("a", 1).await.unwrap();

    let process_fn: ProcessFn<u32> =
        Arc::new(|_item: QueueItem<u32>| async { Ok::<(), DeployError>(()) }.boxed());
    let admission_fn: AdmissionFn = Arc::new(|| {
        async { Err::<usize, DeployError>(DeployError::PlatformError("503".to_string())) }.boxed()
    });

    let result = processor::tick(
        &processor::Options::default(),
        queue.as_ref(),
        &process_fn,
        Some(&admission_fn),
    )
    .await;
    assert_eq!(result, Tick::AdmissionFailed);
    assert_eq!(queue.len().await.unwrap(), 1);
}
