// Concurrency Integration Tests
//
// Readers dispatch without locking while writers attach categories and
// register classes. These tests check readers only ever see whole
// tables.

mod common;

use common::{call, return_1, return_2, return_10, return_20, sel};
use objrt::runtime::{CategoryDescriptor, ClassDescriptor, Runtime};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// Test that a rebuild swaps the whole table at once
///
/// The category replaces two methods. Every table snapshot a reader sees
/// must have either both old or both new implementations.
#[test]
fn test_rebuild_is_atomic_for_readers() {
    let runtime = Arc::new(Runtime::new());
    let class = runtime
        .register_class(
            ClassDescriptor::root("Swapped")
                .with_method("left", return_1)
                .with_method("right", return_10),
        )
        .unwrap();
    let left = sel(&runtime, "left");
    let right = sel(&runtime, "right");
    assert!(runtime.dispatch(&class, left).unwrap().is_some());

    let done = Arc::new(AtomicBool::new(false));
    let observed_new = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let class = class.clone();
            let done = Arc::clone(&done);
            let observed_new = Arc::clone(&observed_new);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let table = class.dispatch_table().unwrap();
                    let l = call(*table.get(left.id()).unwrap(), left);
                    let r = call(*table.get(right.id()).unwrap(), right);
                    match (l, r) {
                        (1, 10) => {}
                        (2, 20) => {
                            observed_new.fetch_add(1, Ordering::Relaxed);
                        }
                        torn => panic!("reader saw a partial table: {torn:?}"),
                    }
                }
            })
        })
        .collect();

    thread::sleep(std::time::Duration::from_millis(10));
    runtime
        .register_category(
            CategoryDescriptor::new("Both", "Swapped")
                .with_method("left", return_2)
                .with_method("right", return_20),
        )
        .unwrap();
    thread::sleep(std::time::Duration::from_millis(10));
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    let table = class.dispatch_table().unwrap();
    assert_eq!(call(*table.get(left.id()).unwrap(), left), 2);
    assert_eq!(call(*table.get(right.id()).unwrap(), right), 20);
}

/// Test dispatch from many threads while classes keep registering
#[test]
fn test_dispatch_during_registration() {
    let runtime = Arc::new(Runtime::new());
    let base = runtime
        .register_class(ClassDescriptor::root("Base").with_method("value", return_1))
        .unwrap();
    let value = sel(&runtime, "value");

    let writer = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || {
            for i in 0..100 {
                runtime
                    .register_class(ClassDescriptor::new(format!("Sub{i}"), "Base"))
                    .unwrap();
                runtime
                    .register_category(
                        CategoryDescriptor::new(format!("Cat{i}"), format!("Sub{i}"))
                            .with_method("value", return_2),
                    )
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let base = base.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let imp = runtime.msg_lookup(&base, value);
                    assert_eq!(call(imp, value), 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(runtime.classes().len(), 101);
    for i in 0..100 {
        let sub = runtime.get_class(&format!("Sub{i}")).unwrap();
        assert_eq!(call(runtime.msg_lookup(&sub, value), value), 2);
    }
}

/// Test that concurrent interning of one name yields one selector
#[test]
fn test_concurrent_selector_registration() {
    let runtime = Arc::new(Runtime::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || runtime.register_selector("shared:", None).unwrap())
        })
        .collect();

    let sels: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(sels.windows(2).all(|pair| pair[0] == pair[1]));
}
