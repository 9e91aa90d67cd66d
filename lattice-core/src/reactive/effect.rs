//! Effect execution with dependency-set diffing.
//!
//! A [`ReactiveEffect`] is a user computation that re-runs whenever a
//! location it read last time changes. The central piece of correctness
//! here is `EffectInner::run`'s bitmask diff (source §4.5): rather than
//! unsubscribing from every old dependency and resubscribing to every new
//! one on each run (which is correct but does needless set churn even
//! when dependencies are stable), each `Dep` carries a `w`/`n` bit pair
//! per nesting depth; a run sets `w` for already-known deps, `track`
//! sets `n` for deps touched this run, and the post-run compaction drops
//! exactly the deps that were tracked last time but not this time.
//!
//! Nesting depth is capped at [`MAX_TRACK_DEPTH`](super::tracking::MAX_TRACK_DEPTH);
//! beyond that the effect falls back to a full detach-and-resubscribe,
//! which is slower but preserves the same diff law.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::dep::{DepCell, EffectId};
use super::key::Key;
use super::tracking::{
    self, enter_depth, exit_depth, is_on_active_stack, pop_active, pop_tracking, push_active,
    push_tracking, MAX_TRACK_DEPTH,
};

fn next_effect_id() -> EffectId {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A `(effect, target, key)` record passed to an effect's `on_track`
/// hook, mirroring the source's dev-mode `onTrack` channel.
#[derive(Debug, Clone)]
pub struct TrackEvent {
    pub effect: EffectId,
    pub target: super::key::TargetId,
    pub key: Key,
}

/// Options accepted by [`effect`].
pub struct EffectOptions {
    /// If true, the effect is constructed inactive-but-not-run; the
    /// caller runs it explicitly via the returned [`EffectRunner`].
    pub lazy: bool,
    /// Run dependent re-executions through this callback instead of
    /// synchronously. Used by computed values (see `computed.rs`) and by
    /// callers implementing their own batching.
    pub scheduler: Option<Box<dyn Fn() + Send + Sync>>,
    /// Allow the effect to remain subscribed to itself during a write
    /// that happens inside its own run (source §4.5/§5: by default a
    /// currently-running effect is excluded from its own trigger list).
    pub allow_recurse: bool,
    pub on_stop: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_track: Option<Box<dyn Fn(&TrackEvent) + Send + Sync>>,
    pub on_trigger: Option<Box<dyn Fn(&super::registry::TriggerEvent) + Send + Sync>>,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            lazy: false,
            scheduler: None,
            allow_recurse: false,
            on_stop: None,
            on_track: None,
            on_trigger: None,
        }
    }
}

/// Internal, shared effect state. Held by `Arc` so `Dep`s can keep a weak
/// back-reference and the active-effect stack can keep a strong one for
/// the duration of a run.
pub struct EffectInner {
    id: EffectId,
    func: Box<dyn Fn() + Send + Sync>,
    scheduler: Option<Box<dyn Fn() + Send + Sync>>,
    allow_recurse: bool,
    on_stop: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_track: Option<Box<dyn Fn(&TrackEvent) + Send + Sync>>,
    pub(crate) on_trigger: Option<Box<dyn Fn(&super::registry::TriggerEvent) + Send + Sync>>,
    active: AtomicBool,
    /// Deps this effect is currently subscribed to. Most effects read a
    /// handful of locations, so this stays inline rather than heap
    /// allocating for the common case. Mutated only while this effect is
    /// on the active stack (during `run`) or while stopping.
    pub(crate) deps: Mutex<SmallVec<[Arc<DepCell>; 4]>>,
}

impl EffectInner {
    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    pub(crate) fn schedule_or_run(self: &Arc<Self>) {
        if let Some(scheduler) = &self.scheduler {
            scheduler();
        } else {
            self.run();
        }
    }

    /// Execute the effect body, tracking the (target, key) pairs it reads
    /// and pruning stale subscriptions. See module docs for the diff
    /// algorithm.
    pub fn run(self: &Arc<Self>) {
        if !self.is_active() {
            // Inactive effects still run their body (source §4.5 step 1)
            // but never track.
            (self.func)();
            return;
        }

        if is_on_active_stack(self) && !self.allow_recurse {
            return;
        }

        push_active(self.clone());
        push_tracking(true);
        let depth = enter_depth();

        if depth <= MAX_TRACK_DEPTH {
            let bit = 1u32 << depth;
            for dep in self.deps.lock().iter() {
                dep.inner.lock().w |= bit;
            }
        } else {
            self.detach_all();
        }

        let run_result = catch_unwind(AssertUnwindSafe(|| (self.func)()));

        if depth <= MAX_TRACK_DEPTH {
            let bit = 1u32 << depth;
            let mut deps = self.deps.lock();
            deps.retain(|dep| {
                let mut inner = dep.inner.lock();
                let was_tracked = inner.w & bit != 0;
                let newly_tracked = inner.n & bit != 0;
                inner.w &= !bit;
                inner.n &= !bit;
                if was_tracked && !newly_tracked {
                    inner.subs.shift_remove(&self.id);
                    false
                } else {
                    true
                }
            });
        }

        exit_depth();
        pop_tracking();
        pop_active();

        if let Err(panic) = run_result {
            tracing::error!(effect = self.id, "effect body panicked during run");
            std::panic::resume_unwind(panic);
        }
    }

    fn detach_all(&self) {
        let mut deps = self.deps.lock();
        for dep in deps.iter() {
            dep.remove(self.id);
        }
        deps.clear();
    }

    pub(crate) fn stop(self: &Arc<Self>) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.detach_all();
        if let Some(on_stop) = &self.on_stop {
            on_stop();
        }
    }
}

/// A handle to a running effect, returned by [`effect`].
///
/// Rust has no stable way to make an arbitrary struct directly callable,
/// so where the source spec calls the runner like a function
/// (`runner()`), this crate exposes [`EffectRunner::run`] instead; the
/// `.effect` back-reference from the source API is [`EffectRunner::effect`].
#[derive(Clone)]
pub struct EffectRunner {
    inner: Arc<EffectInner>,
}

impl EffectRunner {
    /// Re-run the effect, tracking fresh dependencies.
    pub fn run(&self) {
        self.inner.run();
    }

    /// The underlying [`ReactiveEffect`] handle.
    pub fn effect(&self) -> ReactiveEffect {
        ReactiveEffect {
            inner: self.inner.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

/// A stoppable reference to the effect backing an [`EffectRunner`],
/// a [`Computed`](super::computed::Computed), or any other internal
/// subscriber.
#[derive(Clone)]
pub struct ReactiveEffect {
    pub(crate) inner: Arc<EffectInner>,
}

impl ReactiveEffect {
    pub(crate) fn new<F>(f: F, options: EffectOptions) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            id: next_effect_id(),
            func: Box::new(f),
            scheduler: options.scheduler,
            allow_recurse: options.allow_recurse,
            on_stop: options.on_stop,
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            active: AtomicBool::new(true),
            deps: Mutex::new(SmallVec::new()),
        });
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<EffectInner> {
        &self.inner
    }

    pub fn run(&self) {
        self.inner.run();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

/// Create and (unless `options.lazy`) immediately run an effect.
///
/// `f` runs inside a tracking context: every reactive read it performs
/// (through a `Reactive*` container or [`Ref`](super::ref_::Ref)) is
/// recorded as a dependency. Subsequent writes to any of those locations
/// re-run `f` (or invoke `options.scheduler` instead, if set).
pub fn effect<F>(f: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + Send + Sync + 'static,
{
    let lazy = options.lazy;
    let reactive_effect = ReactiveEffect::new(f, options);
    let runner = EffectRunner {
        inner: reactive_effect.inner.clone(),
    };
    if !lazy {
        runner.run();
    }
    runner
}

/// Dispose of an effect: detach it from every dependency, mark it
/// inactive, and invoke its `on_stop` hook. Idempotent.
pub fn stop(runner: &EffectRunner) {
    runner.inner.stop();
}

/// Track `(target, key)` against the currently active effect, if any.
///
/// Implements source §4.5 `track()`: below the depth cap, a single `n`
/// bit flip tells us whether this dep was already seen this run; above
/// the cap, membership is checked directly against `dep.subs`.
pub(crate) fn track_dep(dep: &Arc<DepCell>, target: super::key::TargetId, key: Key) {
    if !tracking::is_tracking_enabled() {
        return;
    }
    let Some(effect) = tracking::active_effect() else {
        return;
    };

    let depth = tracking::track_depth();
    let should_track = if depth >= 1 && depth <= MAX_TRACK_DEPTH {
        let bit = 1u32 << depth;
        let mut inner = dep.inner.lock();
        if inner.n & bit == 0 {
            inner.n |= bit;
            inner.w & bit == 0
        } else {
            false
        }
    } else {
        !dep.inner.lock().subs.contains_key(&effect.id())
    };

    if should_track {
        dep.inner
            .lock()
            .subs
            .insert(effect.id(), Arc::downgrade(&effect));
        effect.deps.lock().push(dep.clone());
        if let Some(on_track) = &effect.on_track {
            on_track(&TrackEvent {
                effect: effect.id(),
                target,
                key,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn effect_runs_immediately_unless_lazy() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let _runner = effect(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_effect_does_not_run_until_invoked() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let runner = effect(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions {
                lazy: true,
                ..Default::default()
            },
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
        runner.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_prevents_further_runs_via_scheduler() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let runner = effect(
            move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
        stop(&runner);
        assert!(!runner.is_active());
        // Running a stopped effect still executes its body (it's a plain
        // function call at that point) but never re-subscribes.
        runner.run();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(runner.effect().inner.deps.lock().is_empty());
    }
}
