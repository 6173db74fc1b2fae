//! # Leader Election Tests
//!
//! Contenders share one in-memory lease with compare-and-swap writes.

mod common;

use common::*;
use random_secret_controller::controller::leader::LeaderElector;
use random_secret_controller::runtime::shutdown::ShutdownCoordinator;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

struct Contender {
    elector: Arc<LeaderElector>,
    coordinator: ShutdownCoordinator,
    handle: tokio::task::JoinHandle<()>,
}

fn spawn_contender(backend: &Arc<MemoryLeaseBackend>, identity: &str) -> Contender {
    let elector = Arc::new(LeaderElector::new(
        backend.clone(),
        fast_lease_settings(identity),
    ));
    let coordinator = ShutdownCoordinator::new(1, Duration::from_millis(1));
    let handle = tokio::spawn(Arc::clone(&elector).run(coordinator.signal()));
    Contender {
        elector,
        coordinator,
        handle,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_at_most_one_leader() {
    let backend = MemoryLeaseBackend::new();
    let a = spawn_contender(&backend, "replica-a");
    let b = spawn_contender(&backend, "replica-b");

    assert!(
        wait_until(
            || a.elector.is_leader() || b.elector.is_leader(),
            Duration::from_secs(2)
        )
        .await,
        "One contender should win the lease"
    );

    for _ in 0..100 {
        assert!(
            !(a.elector.is_leader() && b.elector.is_leader()),
            "Both contenders report leadership"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let leader = if a.elector.is_leader() { "replica-a" } else { "replica-b" };
    assert_eq!(backend.holder().as_deref(), Some(leader));

    a.coordinator.trigger();
    b.coordinator.trigger();
    let _ = a.handle.await;
    let _ = b.handle.await;
}

#[tokio::test]
async fn test_release_hands_over_leadership() {
    let backend = MemoryLeaseBackend::new();
    let first = spawn_contender(&backend, "replica-a");
    assert!(wait_until(|| first.elector.is_leader(), Duration::from_secs(2)).await);

    let second = spawn_contender(&backend, "replica-b");
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!second.elector.is_leader());

    first.coordinator.trigger();
    first.handle.await.unwrap();
    assert!(!first.elector.is_leader());

    // Released, not expired: the takeover happens within a few retries
    assert!(
        wait_until(|| second.elector.is_leader(), Duration::from_millis(400)).await,
        "Remaining contender should take over the released lease"
    );
    assert_eq!(backend.holder().as_deref(), Some("replica-b"));

    second.coordinator.trigger();
    second.handle.await.unwrap();
}

#[tokio::test]
async fn test_expired_lease_is_taken_over() {
    let backend = MemoryLeaseBackend::new();
    let a = LeaderElector::new(backend.clone(), fast_lease_settings("replica-a"));
    let b = LeaderElector::new(backend.clone(), fast_lease_settings("replica-b"));

    assert!(a.try_acquire_or_renew().await.unwrap());
    assert!(!b.try_acquire_or_renew().await.unwrap());

    // No renewal from a for longer than the lease duration
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(b.try_acquire_or_renew().await.unwrap());
    assert_eq!(backend.holder().as_deref(), Some("replica-b"));

    // a now sees a live lease held by someone else
    assert!(!a.try_acquire_or_renew().await.unwrap());
}

#[tokio::test]
async fn test_leadership_lost_after_failed_renewals() {
    let backend = MemoryLeaseBackend::new();
    let contender = spawn_contender(&backend, "replica-a");
    assert!(wait_until(|| contender.elector.is_leader(), Duration::from_secs(2)).await);

    backend.unavailable.store(true, Ordering::SeqCst);
    assert!(
        wait_until(|| !contender.elector.is_leader(), Duration::from_secs(2)).await,
        "Leadership should flip once the renewal budget is spent"
    );

    // Back online: the elector re-acquires its own lease
    backend.unavailable.store(false, Ordering::SeqCst);
    assert!(wait_until(|| contender.elector.is_leader(), Duration::from_secs(2)).await);

    contender.coordinator.trigger();
    contender.handle.await.unwrap();
}

#[tokio::test]
async fn test_hung_renewal_drops_leadership_at_lease_expiry() {
    let backend = MemoryLeaseBackend::new();
    let contender = spawn_contender(&backend, "replica-a");
    assert!(wait_until(|| contender.elector.is_leader(), Duration::from_secs(2)).await);

    // Renewals stop answering; the lease (1s) runs out while one is pending
    backend.hang.store(true, Ordering::SeqCst);
    assert!(
        wait_until(|| !contender.elector.is_leader(), Duration::from_millis(1500)).await,
        "Leadership must not outlive the lease while a renewal hangs"
    );

    // Shutdown is not blocked by the pending acquisition attempt
    contender.coordinator.trigger();
    tokio::time::timeout(Duration::from_secs(1), contender.handle)
        .await
        .expect("Election loop should stop promptly")
        .unwrap();
    assert!(!contender.elector.is_leader());
}

#[tokio::test]
async fn test_await_leadership_resolves_on_acquire() {
    let backend = MemoryLeaseBackend::new();
    let contender = spawn_contender(&backend, "replica-a");

    tokio::time::timeout(Duration::from_secs(2), contender.elector.await_leadership())
        .await
        .expect("Leadership should be acquired");
    assert!(contender.elector.is_leader());

    contender.coordinator.trigger();
    contender.handle.await.unwrap();
}

#[tokio::test]
async fn test_verify_access_fails_when_lease_unreadable() {
    let backend = MemoryLeaseBackend::new();
    backend.unavailable.store(true, Ordering::SeqCst);
    let elector = LeaderElector::new(backend.clone(), fast_lease_settings("replica-a"));
    assert!(elector.verify_access().await.is_err());

    backend.unavailable.store(false, Ordering::SeqCst);
    assert!(elector.verify_access().await.is_ok());
}

#[tokio::test]
async fn test_standalone_elector_is_always_leader() {
    let elector = standalone_elector();
    assert!(elector.is_leader());
    assert!(elector.try_acquire_or_renew().await.unwrap());
}
