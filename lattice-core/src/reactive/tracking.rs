//! Tracking state
//!
//! Two pieces of process-wide (here: thread-local) mutable state drive
//! automatic dependency tracking:
//!
//! - The **active-effect stack**: which [`ReactiveEffect`](super::effect::ReactiveEffect)
//!   is currently running, so a read can attribute itself to it. Nested
//!   effects (an effect that reads a computed, which itself reads a
//!   signal inside another effect's run) push and pop this stack.
//! - The **tracking-enabled stack**: a boolean override stack so library
//!   code running inside a user effect (e.g. the array length-mutator
//!   wrappers in `vec.rs`) can temporarily suppress tracking without
//!   disturbing the active effect.
//!
//! A thread-local (rather than a single global `Mutex`) is the correct
//! port of the source's "one logical execution context": the source
//! assumes a single cooperative thread, and thread-local storage gives
//! each OS thread its own independent cooperative context, which is the
//! design notes' own recommended adaptation for pre-emptive-threading
//! hosts ("requires per-task storage... rather than a shared mutable
//! stack").

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::effect::EffectInner;

/// Above this nesting depth, [`ReactiveEffect::run`](super::effect::ReactiveEffect::run)
/// falls back to fully detaching and resubscribing on every run instead
/// of diffing with the bitmask scheme. An engineering compromise: one
/// tracking bit costs one bit of a `u32` per [`Dep`](super::dep::Dep), so
/// depth is capped at the word size minus headroom for shifts.
pub const MAX_TRACK_DEPTH: u32 = 30;

thread_local! {
    static ACTIVE_STACK: RefCell<Vec<Arc<EffectInner>>> = RefCell::new(Vec::new());
    static TRACKING_STACK: RefCell<Vec<bool>> = RefCell::new(Vec::new());
    static TRACK_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// The effect currently executing on this thread, if any.
pub(crate) fn active_effect() -> Option<Arc<EffectInner>> {
    ACTIVE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Push `effect` as the active effect for the duration of its run.
pub(crate) fn push_active(effect: Arc<EffectInner>) {
    ACTIVE_STACK.with(|stack| stack.borrow_mut().push(effect));
}

pub(crate) fn pop_active() {
    ACTIVE_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// True if `effect` is already somewhere on the active stack (used for
/// the re-entry guard in `ReactiveEffect::run`).
pub(crate) fn is_on_active_stack(effect: &Arc<EffectInner>) -> bool {
    ACTIVE_STACK.with(|stack| stack.borrow().iter().any(|e| Arc::ptr_eq(e, effect)))
}

/// Current nesting depth (0 outside any effect run).
pub(crate) fn track_depth() -> u32 {
    TRACK_DEPTH.with(Cell::get)
}

pub(crate) fn enter_depth() -> u32 {
    TRACK_DEPTH.with(|d| {
        let next = d.get() + 1;
        d.set(next);
        next
    })
}

pub(crate) fn exit_depth() {
    TRACK_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
}

/// Is dependency tracking currently enabled on this thread?
///
/// Defaults to enabled when the stack is empty (outside any
/// `pause_tracking`/`effect.run()` scope reads still track if an effect
/// is active - matching the source default of `shouldTrack = true`).
pub fn is_tracking_enabled() -> bool {
    TRACKING_STACK.with(|stack| stack.borrow().last().copied().unwrap_or(true))
}

pub(crate) fn push_tracking(enabled: bool) {
    TRACKING_STACK.with(|stack| stack.borrow_mut().push(enabled));
}

pub(crate) fn pop_tracking() {
    TRACKING_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Disable tracking for subsequent reads on this thread until
/// [`enable_tracking`] or [`reset_tracking`] is called.
///
/// Used by library code that needs to read reactive state without
/// registering a dependency - e.g. the array length-mutator wrappers,
/// which read `length` internally and would otherwise create a
/// self-dependency.
pub fn pause_tracking() {
    push_tracking(false);
}

/// Re-enable tracking, pushing a new scope (paired with
/// [`reset_tracking`], not [`pause_tracking`]).
pub fn enable_tracking() {
    push_tracking(true);
}

/// Pop the most recent `pause_tracking`/`enable_tracking` scope,
/// restoring whatever was active before it.
pub fn reset_tracking() {
    pop_tracking();
}

/// Run `f` with tracking paused, always restoring prior state even if
/// `f` panics.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    pause_tracking();
    let guard = scopeguard(reset_tracking);
    let result = f();
    drop(guard);
    result
}

/// Minimal drop-guard helper so `untracked`/effect cleanup runs even on
/// unwind, without pulling in the `scopeguard` crate for one call site.
fn scopeguard(f: impl FnOnce()) -> impl Drop {
    struct Guard<F: FnOnce()>(Option<F>);
    impl<F: FnOnce()> Drop for Guard<F> {
        fn drop(&mut self) {
            if let Some(f) = self.0.take() {
                f();
            }
        }
    }
    Guard(Some(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_enabled_by_default() {
        assert!(is_tracking_enabled());
    }

    #[test]
    fn pause_and_reset_tracking() {
        assert!(is_tracking_enabled());
        pause_tracking();
        assert!(!is_tracking_enabled());
        reset_tracking();
        assert!(is_tracking_enabled());
    }

    #[test]
    fn untracked_restores_previous_state() {
        enable_tracking();
        let ran = untracked(|| {
            assert!(!is_tracking_enabled());
            42
        });
        assert_eq!(ran, 42);
        assert!(is_tracking_enabled());
        reset_tracking();
    }
}
