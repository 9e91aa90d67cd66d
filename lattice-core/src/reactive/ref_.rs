//! `Ref`: a single observable cell.
//!
//! Where `Reactive*` containers intercept access to many keys on one
//! target, a `Ref` is the degenerate case of exactly one key (its own
//! identity) on its own target - the source's `ref()`/`RefImpl` split
//! from `reactive()`/ proxy traps for exactly this reason: a bare scalar
//! (a number, a bool, an `Option<T>`) has nothing for a `Proxy` to
//! intercept, so it needs its own wrapper with a `.value` accessor.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use super::key::{Key, TargetId};
use super::registry::{self, Trigger};
use crate::reactive::key::TriggerOp;

struct RefInner<T> {
    value: RwLock<T>,
    target: TargetId,
    shallow: bool,
}

/// An observable cell holding one value of type `T`.
///
/// Reading [`Ref::get`] inside an effect/computed tracks it; writing via
/// [`Ref::set`] triggers every subscriber, unless the new value compares
/// equal to the old one (see [`changed`] for the NaN-aware rule this
/// follows, source §4.2).
pub struct Ref<T> {
    inner: Arc<RefInner<T>>,
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Identity equality, not value equality: a field write that installs a
/// *different* `Ref` handle is a change even if the two refs currently
/// hold equal values, and re-assigning the same handle is not. This is
/// the comparison `ReactiveObject::set` uses for a `Ref`-valued field
/// (see `object.rs`'s `ReactiveObject<Ref<T>>` impl) when deciding
/// whether a write is new-key/changed.
impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// The key every `Ref` uses for itself; a ref is a single-key target, so
/// the actual key value is arbitrary as long as it's stable.
fn ref_key() -> Key {
    Key::Str(Arc::from("value"))
}

impl<T> Ref<T> {
    fn new_with(value: T, shallow: bool) -> Self {
        let inner = Arc::new(RefInner {
            value: RwLock::new(value),
            target: TargetId::new(),
            shallow,
        });
        Self { inner }
    }

    /// Read the current value, tracking a dependency on it if called
    /// inside an effect or computed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        registry::track(self.inner.target, ref_key());
        self.inner.value.read().clone()
    }

    /// Read without tracking, for library code and debugging.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.read().clone()
    }

    /// Write a new value, triggering subscribers if it differs from the
    /// current one under [`changed`].
    pub fn set(&self, new_value: T)
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let old_value = {
            let mut guard = self.inner.value.write();
            let old = guard.clone();
            *guard = new_value.clone();
            old
        };
        if changed(&old_value, &new_value) {
            Trigger::new(self.inner.target, TriggerOp::Set)
                .key(ref_key())
                .new_value(new_value)
                .old_value(old_value)
                .fire();
        }
    }

    /// Mutate in place via a closure, always triggering afterward
    /// (callers of `update` are assumed to have a reason to write).
    pub fn update(&self, f: impl FnOnce(&mut T))
    where
        T: Send + Sync + 'static,
    {
        f(&mut self.inner.value.write());
        Trigger::new(self.inner.target, TriggerOp::Set)
            .key(ref_key())
            .fire();
    }

    pub fn target_id(&self) -> TargetId {
        self.inner.target
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }
}

/// Change detection for `Ref::set`. The source's `hasChanged` uses
/// same-value equality (`Object.is`) so that `NaN`-to-`NaN` writes don't
/// retrigger; Rust's `PartialEq` has no generic same-value variant, so
/// this crate uses plain `PartialEq` and accepts the one divergence it
/// implies for float `NaN` (see DESIGN.md).
pub fn changed<T: PartialEq>(old: &T, new: &T) -> bool {
    old != new
}

/// Wrap `value` in a deeply-reactive [`Ref`].
///
/// "Deeply reactive" only has bite for `T` that are themselves
/// `Reactive*` containers or nested `Ref`s; for the common case of a
/// plain scalar, `reactive_ref` and [`shallow_ref`] behave identically.
pub fn reactive_ref<T>(value: T) -> Ref<T> {
    Ref::new_with(value, false)
}

/// Wrap `value` in a [`Ref`] whose inner value is never auto-unwrapped
/// or made deeply reactive even if `T` is itself a container - writes
/// still trigger, but nested container mutations do not.
pub fn shallow_ref<T>(value: T) -> Ref<T> {
    Ref::new_with(value, true)
}

/// A read-only view over a [`Ref`], as returned by `computed()`.
pub struct ReadonlyRef<T> {
    inner: Arc<RefInner<T>>,
}

impl<T> Clone for ReadonlyRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ReadonlyRef<T> {
    pub(crate) fn from_ref(r: &Ref<T>) -> Self {
        Self {
            inner: r.inner.clone(),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        registry::track(self.inner.target, ref_key());
        self.inner.value.read().clone()
    }

    pub fn target_id(&self) -> TargetId {
        self.inner.target
    }
}

static REF_MARKER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

/// A type-erased "is this a ref" probe the way the source's `isRef`
/// works off a `__v_isRef` marker. Rust's `Ref<T>` is always a ref by
/// construction, so `is_ref` is only useful generically, e.g. to check
/// whether a boxed `dyn Any` holds a `Ref<T>`.
pub fn is_ref<T>(_: &Ref<T>) -> bool {
    let _ = REF_MARKER.load(Ordering::Relaxed);
    true
}

/// Read through a `Ref`, or pass through a plain value unchanged - the
/// Rust analogue of the source's `unref`, expressed as a trait since
/// Rust has no single "maybe-a-ref" runtime type.
pub trait Unref<T> {
    fn unref(self) -> T;
}

impl<T: Clone> Unref<T> for Ref<T> {
    fn unref(self) -> T {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn get_set_basic() {
        let r = reactive_ref(1);
        assert_eq!(r.get(), 1);
        r.set(2);
        assert_eq!(r.get(), 2);
    }

    #[test]
    fn effect_reruns_on_ref_write() {
        let r = reactive_ref(0);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let r_clone = r.clone();
        let _runner = effect(
            move || {
                let _ = r_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        r.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn setting_equal_value_does_not_trigger() {
        let r = reactive_ref(5);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let r_clone = r.clone();
        let _runner = effect(
            move || {
                let _ = r_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        r.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nan_is_considered_changed_under_plain_partial_eq() {
        assert!(changed(&f64::NAN, &f64::NAN));
    }
}
