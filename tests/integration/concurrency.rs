//! Concurrent producers, readers and structural changes

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use trellis_engine::{Package, Rule, RuleBase, RuleBaseConfiguration};
use trellis_foundation::EntryPointId;

struct Order;
struct Shipment;

/// Version `n` carries `n` rules and `n` globals.
fn versioned(n: u32) -> Package {
    (0..n).fold(Package::new("catalog").with_version(n), |package, i| {
        package
            .with_rule(Rule::new(format!("rule-{i}")).of_type::<Order>())
            .with_global::<u32>(format!("global-{i}"))
    })
}

#[test]
fn readers_never_see_a_half_replaced_package() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(versioned(1)).unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let rb = Arc::clone(&rb);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let snapshot = rb.packages();
                    let package = snapshot.package("catalog").unwrap();
                    assert_eq!(package.rule_count(), package.version() as usize);
                    assert_eq!(snapshot.globals().len(), snapshot.rule_count());
                }
            })
        })
        .collect();

    for n in 2..40 {
        rb.add_package(versioned(n)).unwrap();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(rb.node_count(), 39);
}

#[test]
fn concurrent_inserts_on_one_entry_point() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    rb.add_package(Package::new("p").with_rule(Rule::new("any").of_type::<Order>()))
        .unwrap();
    let session = rb.new_session().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    session.insert(Order).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(session.fact_count(), 1_000);
    assert_eq!(session.activations().len(), 1_000);
    let entry_point = rb.entry_point(&EntryPointId::default()).unwrap();
    assert_eq!(entry_point.last_propagated(), 1_000);
}

#[test]
fn sessions_evaluate_in_parallel_partitions() {
    let rb = RuleBase::new(RuleBaseConfiguration::multithreaded());
    rb.add_package(
        Package::new("p")
            .with_rule(Rule::new("orders").of_type::<Order>())
            .with_rule(Rule::new("shipments").of_type::<Shipment>()),
    )
    .unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let session = rb.new_session().unwrap();
            thread::spawn(move || {
                for _ in 0..100 {
                    if i % 2 == 0 {
                        session.insert(Order).unwrap();
                    } else {
                        session.insert(Shipment).unwrap();
                    }
                }
                session.fire_all_rules().unwrap()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), 100);
    }
}

#[test]
fn package_added_during_inserts_sees_every_fact() {
    let rb = RuleBase::new(RuleBaseConfiguration::default());
    let session = rb.new_session().unwrap();

    let producer = {
        let session = session.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                session.insert(Order).unwrap();
            }
        })
    };
    rb.add_package(Package::new("late").with_rule(Rule::new("any").of_type::<Order>()))
        .unwrap();
    producer.join().unwrap();

    assert_eq!(session.fact_count(), 500);
    assert_eq!(session.activations().len(), 500);
}
