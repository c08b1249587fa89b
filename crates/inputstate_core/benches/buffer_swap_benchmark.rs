//! # Buffer Swap Benchmark
//!
//! Proves flips are pointer swaps: the cost of a swap must not grow with the
//! size of a device's state, only reallocation may.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inputstate_core::{DeviceBuilder, InputDevice, StateBuffers, UpdateMask, UpdateMode};

fn devices(count: usize, size: u32) -> Vec<InputDevice> {
    (0..count)
        .map(|i| DeviceBuilder::new(format!("device{i}"), "BNCH").min_size(size).build().unwrap())
        .collect()
}

fn installed(mask: UpdateMask, devices: &mut [InputDevice]) -> StateBuffers {
    let mut buffers = StateBuffers::new();
    let offsets = buffers.allocate_all(mask, devices).expect("allocate");
    buffers
        .migrate_all(devices, &offsets, &StateBuffers::new(), None)
        .expect("install");
    buffers
}

/// Swap cost per device for growing state sizes.
fn bench_swap(c: &mut Criterion) {
    let mut group = c.benchmark_group("double_buffer_swap");

    for size in [4u32, 64, 1024, 16 * 1024] {
        let mut devices = devices(8, size);
        let mut buffers = installed(UpdateMask::DYNAMIC, &mut devices);

        group.bench_with_input(BenchmarkId::new("state_bytes", size), &size, |b, _| {
            b.iter(|| {
                for index in 0..8 {
                    buffers
                        .swap_buffers(UpdateMode::Dynamic, black_box(index))
                        .expect("swap");
                }
            });
        });
    }

    group.finish();
}

/// Full reallocation with migration when one device is added.
fn bench_reallocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_buffers_reallocate");
    let mask = UpdateMask::DYNAMIC | UpdateMode::Fixed;

    for count in [4usize, 32, 256] {
        let mut base = devices(count, 64);
        let old = installed(mask, &mut base);

        group.bench_with_input(BenchmarkId::new("devices", count), &count, |b, _| {
            b.iter(|| {
                let mut grown = base.clone();
                grown.push(DeviceBuilder::new("added", "BNCH").min_size(64).build().unwrap());
                let mut new = StateBuffers::new();
                let offsets = new.allocate_all(mask, &grown).expect("allocate");
                black_box(new.migrate_all(&mut grown, &offsets, &old, None).expect("migrate"));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_swap, bench_reallocate);
criterion_main!(benches);
