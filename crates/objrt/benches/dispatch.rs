// Dispatch benchmarks for the objrt runtime
//
// This benchmark suite measures:
// - Warm dispatch through a published table
// - Inheritance depth (tables are flattened, so depth should not matter)
// - Misses that walk the superclass chain
// - Table rebuild cost when one category attaches
// - Multi-threaded dispatch

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use objrt::runtime::{
    CategoryDescriptor, ClassDescriptor, ObjectPtr, Runtime, Sel, SparseArray,
};
use std::sync::Arc;
use std::thread;

unsafe extern "C" fn empty_impl(_: ObjectPtr, _: Sel, _: *const *mut u8, _: *mut u8) {}

/// Builds a chain `Level0 <- Level1 <- ... <- Level{depth}` with `method`
/// declared on the root only.
fn build_chain(runtime: &Runtime, depth: usize, method: &str) -> objrt::Class {
    let mut class = runtime
        .register_class(ClassDescriptor::root("Level0").with_method(method, empty_impl))
        .unwrap();
    for level in 1..=depth {
        class = runtime
            .register_class(ClassDescriptor::new(
                format!("Level{level}"),
                format!("Level{}", level - 1),
            ))
            .unwrap();
    }
    class
}

/// Benchmark warm dispatch - repeated lookups of one selector
fn bench_warm_dispatch(c: &mut Criterion) {
    let runtime = Runtime::new();
    let class = runtime
        .register_class(ClassDescriptor::root("Warm").with_method("testMethod:", empty_impl))
        .unwrap();
    let sel = runtime.register_selector("testMethod:", None).unwrap();
    runtime.dispatch(&class, sel).unwrap();

    c.bench_function("warm_dispatch", |b| {
        b.iter(|| black_box(runtime.msg_lookup(black_box(&class), black_box(sel))))
    });
}

/// Benchmark dispatch at increasing inheritance depth
fn bench_inheritance_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("inheritance_depth");

    for depth in [0usize, 1, 4, 16] {
        let runtime = Runtime::new();
        let leaf = build_chain(&runtime, depth, "inherited:");
        let sel = runtime.register_selector("inherited:", None).unwrap();
        runtime.dispatch(&leaf, sel).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(runtime.dispatch(&leaf, black_box(sel))))
        });
    }

    group.finish();
}

/// Benchmark misses, which consult every superclass table
fn bench_miss(c: &mut Criterion) {
    let runtime = Runtime::new();
    let leaf = build_chain(&runtime, 8, "present:");
    let missing = runtime.register_selector("missing:", None).unwrap();
    runtime.dispatch(&leaf, missing).unwrap();

    c.bench_function("dispatch_miss_depth_8", |b| {
        b.iter(|| black_box(runtime.dispatch(&leaf, black_box(missing))))
    });
}

/// Benchmark the rebuild triggered by attaching a category
fn bench_category_attach(c: &mut Criterion) {
    let mut group = c.benchmark_group("category_attach");

    for methods in [1usize, 16, 256] {
        group.throughput(Throughput::Elements(methods as u64));
        group.bench_with_input(BenchmarkId::from_parameter(methods), &methods, |b, &methods| {
            b.iter_batched(
                || {
                    let runtime = Runtime::new();
                    let mut desc = ClassDescriptor::root("Patched");
                    for i in 0..methods {
                        desc = desc.with_method(format!("method{i}:"), empty_impl);
                    }
                    let class = runtime.register_class(desc).unwrap();
                    let sel = runtime.register_selector("method0:", None).unwrap();
                    runtime.dispatch(&class, sel).unwrap();
                    runtime
                },
                |runtime| {
                    runtime
                        .register_category(
                            CategoryDescriptor::new("Patch", "Patched")
                                .with_method("method0:", empty_impl),
                        )
                        .unwrap();
                    runtime
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark raw sparse array reads against a populated table
fn bench_sparse_lookup(c: &mut Criterion) {
    let mut table = SparseArray::new();
    for key in (0..4096u32).map(|i| i * 4099 % (1 << 24)) {
        table.set(key, key).unwrap();
    }

    c.bench_function("sparse_lookup_hit", |b| {
        b.iter(|| black_box(table.get(black_box(4099 * 17 % (1 << 24)))))
    });
    c.bench_function("sparse_lookup_empty_branch", |b| {
        b.iter(|| black_box(table.get(black_box(0x00ff_ff00))))
    });
}

/// Benchmark dispatch from several threads at once
fn bench_multithreaded_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("multithreaded_dispatch");

    for threads in [1usize, 2, 4, 8] {
        let runtime = Arc::new(Runtime::new());
        let class = runtime
            .register_class(ClassDescriptor::root("Shared").with_method("shared:", empty_impl))
            .unwrap();
        let sel = runtime.register_selector("shared:", None).unwrap();
        runtime.dispatch(&class, sel).unwrap();

        group.throughput(Throughput::Elements((threads * 1000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let runtime = Arc::clone(&runtime);
                        let class = class.clone();
                        thread::spawn(move || {
                            for _ in 0..1000 {
                                black_box(runtime.msg_lookup(&class, sel));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_warm_dispatch,
    bench_inheritance_depth,
    bench_miss,
    bench_category_attach,
    bench_sparse_lookup,
    bench_multithreaded_dispatch
);

criterion_main!(benches);
