//! Integration tests for the double barrier

use std::sync::Arc;

use minicoord::store::MemorySession;
use minicoord::{
    BarrierSpec, BarrierState, CoordinationStore, DoubleBarrier, Error, MemoryStore,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .try_init();
}

async fn participant(store: &MemoryStore, entry: &str, size: usize) -> Arc<DoubleBarrier> {
    Arc::new(
        DoubleBarrier::create(
            Arc::new(store.session()),
            BarrierSpec::new("compute", entry, size),
        )
        .await
        .unwrap(),
    )
}

/// Entry nodes under the barrier path, ignoring the readiness marker.
async fn entries(observer: &MemorySession) -> Vec<String> {
    observer
        .children("/compute")
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c != "READY")
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_all_participants_enter_and_leave() {
    init_logging();
    const N: usize = 4;

    let store = Arc::new(MemoryStore::new());
    let observer = store.session();
    let rendezvous = Arc::new(tokio::sync::Barrier::new(N + 1));

    let mut handles = Vec::new();
    for i in 0..N {
        let store = Arc::clone(&store);
        let rendezvous = Arc::clone(&rendezvous);
        handles.push(tokio::spawn(async move {
            let barrier = participant(&store, &format!("worker-{}", i), N).await;

            barrier.enter().await.unwrap();
            assert_eq!(barrier.state(), BarrierState::Inside);
            // No enter returns before all entry nodes exist, and nobody has
            // left yet, so every participant observes the full set.
            assert_eq!(entries(&store.session()).await.len(), N);

            // Hold everyone inside until the whole group has asserted.
            rendezvous.wait().await;

            barrier.leave().await.unwrap();
            assert_eq!(barrier.state(), BarrierState::Outside);
        }));
    }

    rendezvous.wait().await;
    for handle in handles {
        handle.await.unwrap();
    }

    // After the last leave, the barrier path has zero children.
    assert!(entries(&observer).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_barrier_is_reusable_after_full_cycle() {
    init_logging();
    const N: usize = 3;

    let store = Arc::new(MemoryStore::new());

    for _round in 0..2 {
        let mut handles = Vec::new();
        for i in 0..N {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let barrier = participant(&store, &format!("worker-{}", i), N).await;
                barrier.enter().await.unwrap();
                barrier.leave().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(entries(&store.session()).await.is_empty());
    }
}

#[tokio::test]
async fn test_single_participant_never_waits() {
    let store = MemoryStore::new();
    let barrier = participant(&store, "only", 1).await;

    barrier.enter().await.unwrap();
    barrier.leave().await.unwrap();
    assert_eq!(barrier.state(), BarrierState::Outside);
}

#[tokio::test]
async fn test_cancel_with_no_wait_is_a_noop() {
    let store = MemoryStore::new();
    let barrier = participant(&store, "only", 1).await;

    barrier.cancel();
    barrier.cancel();

    barrier.enter().await.unwrap();
    barrier.leave().await.unwrap();
}

#[tokio::test]
async fn test_cancel_unblocks_enter_exactly_once() {
    let store = MemoryStore::new();
    let barrier = participant(&store, "worker-0", 2).await;

    let entering = {
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move { barrier.enter().await })
    };
    tokio::task::yield_now().await;

    barrier.cancel();
    let err = entering.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    // No rollback on cancellation: the participant is stuck entering and its
    // entry node is still registered. Destroy recovers.
    assert_eq!(barrier.state(), BarrierState::Entering);
    assert_eq!(entries(&store.session()).await, vec!["worker-0"]);

    barrier.destroy().await;
    assert_eq!(barrier.state(), BarrierState::Destroyed);
    assert!(matches!(
        store.session().children("/compute").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_unblocks_leave() {
    init_logging();
    const N: usize = 3;

    let store = Arc::new(MemoryStore::new());
    let mut barriers = Vec::new();
    let mut handles = Vec::new();
    for i in 0..N {
        let barrier = participant(&store, &format!("worker-{}", i), N).await;
        barriers.push(Arc::clone(&barrier));
        handles.push(tokio::spawn(async move { barrier.enter().await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // worker-0 sorts first, so its leave waits on the highest entry.
    let leaving = {
        let barrier = Arc::clone(&barriers[0]);
        tokio::spawn(async move { barrier.leave().await })
    };
    tokio::task::yield_now().await;

    barriers[0].cancel();
    let err = leaving.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(barriers[0].state(), BarrierState::Leaving);
}

#[tokio::test]
async fn test_crashed_participant_entry_vanishes() {
    let store = MemoryStore::new();
    let session = Arc::new(store.session());
    let barrier = Arc::new(
        DoubleBarrier::create(
            Arc::clone(&session) as Arc<dyn CoordinationStore>,
            BarrierSpec::new("compute", "worker-0", 2),
        )
        .await
        .unwrap(),
    );

    let entering = {
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move { barrier.enter().await })
    };
    tokio::task::yield_now().await;

    let observer = store.session();
    assert_eq!(entries(&observer).await, vec!["worker-0"]);

    // The participant's session dies; its ephemeral entry goes with it.
    session.close();
    assert!(entries(&observer).await.is_empty());

    barrier.cancel();
    assert!(matches!(
        entering.await.unwrap(),
        Err(Error::Cancelled)
    ));
}
