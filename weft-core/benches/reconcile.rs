//! Benchmarks for keyed reconciliation and the LIS helper.
//!
//! Run with: cargo bench -p weft-core

use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_core::prelude::*;
use weft_core::render::longest_increasing_subsequence;

fn keyed_list(keys: &[usize]) -> VNodeRef {
    let items = keys
        .iter()
        .map(|key| h("li", props([("key", *key)]), key.to_string()))
        .collect::<Vec<_>>();
    h("ul", Props::new(), items)
}

/// `n` keys with every block of 7 rotated by one, so most nodes move.
fn shuffled(n: usize) -> Vec<usize> {
    let mut keys: Vec<usize> = (0..n).collect();
    for chunk in keys.chunks_mut(7) {
        chunk.rotate_left(1);
    }
    keys
}

fn bench_keyed_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/keyed");

    for n in [10, 100, 1000] {
        let ordered: Vec<usize> = (0..n).collect();
        let shuffled = shuffled(n);

        group.bench_with_input(BenchmarkId::new("shuffle", n), &n, |b, _| {
            let host = Rc::new(MemoryHost::new());
            let renderer = Renderer::new(Runtime::new(), host.clone());
            let root = host.create_root();

            b.iter(|| {
                renderer.render(Some(keyed_list(&ordered)), root);
                renderer.render(Some(keyed_list(&shuffled)), root);
                host.clear_ops();
            })
        });

        let mut reversed = ordered.clone();
        reversed.reverse();
        group.bench_with_input(BenchmarkId::new("reverse", n), &n, |b, _| {
            let host = Rc::new(MemoryHost::new());
            let renderer = Renderer::new(Runtime::new(), host.clone());
            let root = host.create_root();

            b.iter(|| {
                renderer.render(Some(keyed_list(&ordered)), root);
                renderer.render(Some(keyed_list(&reversed)), root);
                host.clear_ops();
            })
        });
    }

    group.finish();
}

fn bench_lis(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile/lis");

    for n in [16, 256, 4096] {
        // Old positions + 1, with every third slot new.
        let table: Vec<usize> = shuffled(n)
            .into_iter()
            .enumerate()
            .map(|(i, old)| if i % 3 == 0 { 0 } else { old + 1 })
            .collect();

        group.bench_with_input(BenchmarkId::new("sequence", n), &table, |b, table| {
            b.iter(|| black_box(longest_increasing_subsequence(black_box(table))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_keyed_patch, bench_lis);
criterion_main!(benches);
