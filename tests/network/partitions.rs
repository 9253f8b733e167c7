//! Integration tests for partition allocation and ordered locking

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use trellis_foundation::{ErrorCategory, ErrorKind, RuleBasePartitionId};
use trellis_network::PartitionManager;

#[test]
fn ids_are_never_reused() {
    let manager = PartitionManager::new();
    let first = manager.create_new_partition_id();
    manager.retire(first).unwrap();
    let second = manager.create_new_partition_id();

    assert!(second > first);
    assert_eq!(
        manager.partition_ids(),
        vec![RuleBasePartitionId::MAIN, first, second]
    );
    assert_eq!(
        manager.active_partition_ids(),
        vec![RuleBasePartitionId::MAIN, second]
    );
}

#[test]
fn descending_acquisition_is_a_lock_order_violation() {
    let manager = PartitionManager::new();
    let low = manager.create_new_partition_id();
    let high = manager.create_new_partition_id();

    let _held = manager.lock(&[high]).unwrap();
    let err = manager.lock(&[low]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Concurrency);
    assert!(matches!(
        err.kind,
        ErrorKind::LockOrderViolation { held, requested } if held == high && requested == low
    ));
}

#[test]
fn guard_release_allows_any_order_again() {
    let manager = PartitionManager::new();
    let low = manager.create_new_partition_id();
    let high = manager.create_new_partition_id();

    drop(manager.lock(&[high]).unwrap());
    assert!(manager.lock(&[low]).is_ok());
}

#[test]
fn shared_partition_serializes_threads() {
    let manager = Arc::new(PartitionManager::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            thread::spawn(move || {
                for _ in 0..200 {
                    let _guard = manager.lock(&[RuleBasePartitionId::MAIN]).unwrap();
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}
