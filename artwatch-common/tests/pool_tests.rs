//! Worker pool lifecycle tests
//!
//! Exercises liveness, promise delivery, and cooperative shutdown across the
//! public surface, the way the services drive the pool.

use artwatch_common::pool::WorkerPool;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn pool_drains_every_job_before_the_stream_ends() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let pool = {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        WorkerPool::new(4, move |job: usize| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                job + 1
            }
        })
    };
    pool.work();

    let feeder = {
        let jobs: Vec<usize> = (0..50).collect();
        async {
            pool.extend(jobs).await.unwrap();
            pool.close();
        }
    };
    let (_, results) = tokio::join!(feeder, pool.stream().collect::<Vec<_>>());

    assert_eq!(results.len(), 50);
    assert!(pool.closed());
    // Never more workers active than the pool capacity.
    assert!(peak.load(Ordering::SeqCst) <= 4);
}

#[tokio::test]
async fn mixed_add_and_promise_submissions_share_one_budget() {
    let pool = WorkerPool::new(2, |job: i64| async move { job * 2 });
    pool.work();

    pool.extend([1, 2, 3]).await.unwrap();
    let promised_ten = pool.promise(10).await.unwrap();
    let promised_eleven = pool.promise(11).await.unwrap();
    pool.close();

    let mut shared: Vec<i64> = pool.stream().map(|r| r.value).collect().await;
    shared.sort();

    // The iterator sees only the fire-and-forget jobs; the promises resolve
    // on their own carriers and then close.
    assert_eq!(shared, vec![2, 4, 6]);
    assert_eq!(promised_ten.await.unwrap(), 20);
    assert_eq!(promised_eleven.await.unwrap(), 22);
}

#[tokio::test]
async fn promise_carrier_closes_after_its_single_value() {
    let pool = WorkerPool::new(1, |job: u32| async move { job });
    pool.work();

    let handle = pool.promise(7).await.unwrap();
    assert_eq!(handle.await.unwrap(), 7);
    // The carrier is consumed by the await above; the pool keeps running.
    pool.add(8).await.unwrap();
    pool.close();
    let results: Vec<_> = pool.stream().map(|r| r.value).collect().await;
    assert_eq!(results, vec![8]);
}

#[tokio::test]
async fn responses_carry_distinct_arrival_indexes() {
    let pool = WorkerPool::new(3, |job: u64| async move { job });
    pool.work();

    let feeder = async {
        pool.extend(0..20).await.unwrap();
        pool.close();
    };
    let (_, mut indexes) = tokio::join!(
        feeder,
        pool.stream().map(|r| r.index).collect::<Vec<u64>>()
    );
    indexes.sort();
    assert_eq!(indexes, (0..20).collect::<Vec<_>>());
}

#[tokio::test]
async fn cancellation_aware_jobs_return_promptly() {
    use tokio_util::sync::CancellationToken;

    let token = CancellationToken::new();
    let pool = {
        let token = token.clone();
        WorkerPool::new(2, move |job: u32| {
            let token = token.clone();
            async move {
                if token.is_cancelled() {
                    return 0;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                job
            }
        })
    };
    pool.work();
    pool.extend([1, 2]).await.unwrap();
    token.cancel();
    pool.extend([3, 4]).await.unwrap();
    pool.close();

    let results: Vec<u32> = pool.stream().map(|r| r.value).collect().await;
    assert_eq!(results.len(), 4);
    // Jobs submitted after cancellation observe it and yield zero results.
    assert!(results.contains(&0));
}
