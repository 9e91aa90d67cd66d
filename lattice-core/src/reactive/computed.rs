//! `Computed`: a lazily-evaluated value derived from other reactive
//! state.
//!
//! A computed is implemented as a [`Ref`]-shaped cell plus an internal
//! [`ReactiveEffect`] whose scheduler doesn't re-run the getter - it just
//! flips a dirty flag. The value is recomputed on the next [`Computed::get`]
//! call, which is what makes this lazy (pull-based) rather than eager
//! (push-based): a computed nobody reads after its dependency changes
//! never pays for a re-run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::effect::{EffectOptions, ReactiveEffect};
use super::key::{Key, TargetId, TriggerOp};
use super::registry::{self, Trigger};

struct ComputedInner<T> {
    target: TargetId,
    value: Mutex<Option<T>>,
    dirty: AtomicBool,
    effect: ReactiveEffect,
}

fn computed_key() -> Key {
    Key::Str(Arc::from("value"))
}

/// A read-only, cached, lazily-recomputed value.
///
/// Cloning a `Computed` clones the handle, not the value - all clones
/// share one cache cell and one dirty flag, matching `Ref`'s sharing
/// semantics.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Computed<T> {
    /// Read the cached value, recomputing first if a dependency has
    /// changed since the last read. Tracks a dependency on this computed
    /// itself if called inside another effect/computed, so computed
    /// chains propagate dirtiness the same way plain refs do.
    pub fn get(&self) -> T {
        if self.inner.dirty.load(Ordering::SeqCst) {
            self.recompute();
        }
        registry::track(self.inner.target, computed_key());
        self.inner
            .value
            .lock()
            .clone()
            .expect("computed value populated by recompute")
    }

    fn recompute(&self) {
        // Run the getter under the internal effect so it re-tracks its
        // own dependencies, but outside of *this* read's tracking
        // context, matching the source's "computed effects run without
        // polluting the caller's active-effect stack" behavior (the
        // nested push/pop in `EffectInner::run` already achieves this;
        // we just need to call run() rather than the raw getter).
        self.inner.effect.run();
        self.inner.dirty.store(false, Ordering::SeqCst);
    }
}

/// Construct a computed from a getter closure.
///
/// The internal effect is built with `lazy: true` and never run here -
/// the getter does not execute until the first `get()` call finds
/// `dirty` set (source §4.8: "lazy (no initial run)"). Subsequent
/// dependency changes mark the computed dirty via the effect's
/// scheduler rather than recomputing inline; recomputation happens on
/// the next `get`.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let target = TargetId::new();
    let value: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
    let dirty = Arc::new(AtomicBool::new(true));

    let value_for_effect = value.clone();
    let dirty_for_effect = dirty.clone();
    let dirty_for_scheduler = dirty.clone();

    let effect = ReactiveEffect::new(
        move || {
            let computed_value = getter();
            *value_for_effect.lock() = Some(computed_value);
            dirty_for_effect.store(false, Ordering::SeqCst);
        },
        EffectOptions {
            lazy: true,
            scheduler: Some(Box::new(move || {
                // Don't eagerly recompute; just mark dirty and (if
                // anyone is watching this computed) let its own
                // trigger fan out to its subscribers, the same way a
                // `Ref` write would.
                let was_dirty = dirty_for_scheduler.swap(true, Ordering::SeqCst);
                if !was_dirty {
                    Trigger::new(target, TriggerOp::Set)
                        .key(computed_key())
                        .fire();
                }
            })),
            ..Default::default()
        },
    );

    Computed {
        inner: Arc::new(ComputedInner {
            target,
            value,
            dirty,
            effect,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use crate::reactive::ref_::reactive_ref;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn computed_reflects_source_ref() {
        let source = reactive_ref(2);
        let source_clone = source.clone();
        let doubled = computed(move || source_clone.get() * 2);
        assert_eq!(doubled.get(), 4);
        source.set(3);
        assert_eq!(doubled.get(), 6);
    }

    #[test]
    fn computed_is_lazy_until_read() {
        let source = reactive_ref(1);
        let eval_count = Arc::new(AtomicI32::new(0));
        let source_clone = source.clone();
        let eval_count_clone = eval_count.clone();
        let doubled = computed(move || {
            eval_count_clone.fetch_add(1, Ordering::SeqCst);
            source_clone.get() * 2
        });
        // Construction never runs the getter (source §4.8: lazy, no
        // initial run).
        assert_eq!(eval_count.load(Ordering::SeqCst), 0);
        assert_eq!(doubled.get(), 2);
        assert_eq!(eval_count.load(Ordering::SeqCst), 1);
        source.set(2);
        // Dirtied, but not recomputed until the next `get`.
        assert_eq!(eval_count.load(Ordering::SeqCst), 1);
        assert_eq!(doubled.get(), 4);
        assert_eq!(eval_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_reruns_when_dependent_computed_changes() {
        let source = reactive_ref(1);
        let source_clone = source.clone();
        let doubled = computed(move || source_clone.get() * 2);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let doubled_clone = doubled.clone();
        let _runner = effect(
            move || {
                let _ = doubled_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        source.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(doubled.get(), 10);
    }
}
