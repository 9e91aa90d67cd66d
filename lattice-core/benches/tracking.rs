//! Benchmarks for the dependency-tracking engine.
//!
//! These measure the cost the dep-diff algorithm (`effect::EffectInner::run`,
//! see source §4.5 "why bitfields?") is meant to amortize: re-running an
//! effect whose dependency set is stable should not scale with how many
//! other effects/refs exist in the program, and a conditional effect that
//! stops reading a branch should actually drop that dependency rather
//! than carry it forever.

use criterion::{criterion_group, criterion_main, black_box, BenchmarkId, Criterion};

use lattice_core::reactive::{computed, effect, reactive, reactive_ref, EffectOptions, RawObject};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn bench_ref_rerun(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("ref_set_rerun_single_effect");
    let r = reactive_ref(0_i64);
    let r_clone = r.clone();
    let _runner = effect(
        move || {
            black_box(r_clone.get());
        },
        EffectOptions::default(),
    );
    group.bench_function("set", |b| {
        let mut v = 0_i64;
        b.iter(|| {
            v = v.wrapping_add(1);
            r.set(black_box(v));
        });
    });
    group.finish();
}

/// `n` independent effects each reading their own ref; writing one ref
/// should only re-run the one effect subscribed to it, so this should
/// stay roughly constant as `n` grows.
fn bench_fanout_independent_refs(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("fanout_independent_refs_set_one");
    for &n in &[10_usize, 100, 1_000] {
        let refs: Vec<_> = (0..n).map(|i| reactive_ref(i as i64)).collect();
        let _runners: Vec<_> = refs
            .iter()
            .map(|r| {
                let r_clone = r.clone();
                effect(
                    move || {
                        black_box(r_clone.get());
                    },
                    EffectOptions::default(),
                )
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let target = &refs[n / 2];
            let mut v = 0_i64;
            b.iter(|| {
                v = v.wrapping_add(1);
                target.set(black_box(v));
            });
        });
    }
    group.finish();
}

/// A single effect that reads one field of an object with a growing
/// number of unrelated fields; writing an unread field must not re-run
/// the effect, so iteration count is the thing under test, not timing
/// alone - run under `cargo bench` with `--verbose` to eyeball no-reruns.
fn bench_object_sibling_fields(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("object_write_unwatched_sibling_field");
    for &n in &[10_usize, 100, 1_000] {
        let mut fields = indexmap::IndexMap::new();
        for i in 0..n {
            fields.insert(Arc::from(format!("field{i}").as_str()), 0_i64);
        }
        let obj = reactive(RawObject::new(fields));
        let obj_clone = obj.clone();
        let _runner = effect(
            move || {
                black_box(obj_clone.get("field0"));
            },
            EffectOptions::default(),
        );
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let sibling_key = format!("field{}", n - 1);
            let mut v = 0_i64;
            b.iter(|| {
                v = v.wrapping_add(1);
                obj.set(&sibling_key, black_box(v)).unwrap();
            });
        });
    }
    group.finish();
}

/// Chained computed values (`a -> b = computed(a) -> c = computed(b)`)
/// of increasing depth, reading the tail after writing the root. Lazy
/// invalidation means only a dirty flag should propagate eagerly; the
/// actual recompute chain only runs once, on the final `get`.
fn bench_computed_chain(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("computed_chain_depth");
    for &depth in &[1_usize, 10, 50] {
        let root = reactive_ref(0_i64);
        let mut tail = {
            let root_clone = root.clone();
            computed(move || root_clone.get())
        };
        for _ in 1..depth {
            let prev = tail.clone();
            tail = computed(move || prev.get() + 1);
        }
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut v = 0_i64;
            b.iter(|| {
                v = v.wrapping_add(1);
                root.set(black_box(v));
                black_box(tail.get());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_ref_rerun,
    bench_fanout_independent_refs,
    bench_object_sibling_fields,
    bench_computed_chain
);
criterion_main!(benches);
