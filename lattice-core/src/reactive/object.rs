//! `ReactiveObject`: field access tracking for a record/struct-shaped
//! target.
//!
//! JS's `Proxy` intercepts arbitrary property access on a plain object
//! transparently; Rust has no analogous dynamic dispatch on field
//! access, so this is a concrete keyed container plus explicit
//! `get`/`set`/`delete` methods that do the bookkeeping a `get`/`set`
//! trap would do. See `SPEC_FULL.md` §2 for why this shape was chosen
//! over alternatives (a macro-generated per-struct proxy was considered
//! and rejected: it can't express "wrap an existing struct without
//! owning its definition", which the four `reactive()`/`readonly()`/
//! `shallow_reactive()`/`shallow_readonly()` entry points all need).

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::error::ReactiveError;
use super::key::{Key, TargetId, TriggerOp};
use super::ref_::{reactive_ref, Ref};
use super::registry::{self, RawIdentity, Trigger};

/// Which of the four wrap modes a proxy was constructed with, plus the
/// `Untracked` passthrough used when a target isn't object-like, is
/// frozen, or was explicitly marked raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    DeepMutable,
    DeepReadonly,
    ShallowMutable,
    ShallowReadonly,
    /// Wrapping was refused; the caller holds the raw target with no
    /// tracking. JS returns the bare object from a failed `reactive()`
    /// call; Rust can't return a different concrete type from the same
    /// function, so this variant exists so `ReactiveObject` can still be
    /// the return type while carrying "tracking is off" in its mode.
    Untracked,
}

impl WrapMode {
    pub fn is_readonly(self) -> bool {
        matches!(self, WrapMode::DeepReadonly | WrapMode::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, WrapMode::ShallowMutable | WrapMode::ShallowReadonly)
    }

    pub fn is_reactive(self) -> bool {
        !matches!(self, WrapMode::Untracked) && !self.is_readonly()
    }
}

struct RawInner<V> {
    fields: RwLock<IndexMap<Arc<str>, V>>,
}

/// The un-wrapped backing storage for a reactive object. `reactive()`,
/// `readonly()`, `shallow_reactive()` and `shallow_readonly()` all wrap
/// the same `RawObject` identity, so they share one dependency graph
/// (see `registry::target_id_for`).
pub struct RawObject<V> {
    inner: Arc<RawInner<V>>,
}

impl<V> Clone for RawObject<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> RawObject<V> {
    pub fn new(fields: IndexMap<Arc<str>, V>) -> Self {
        Self {
            inner: Arc::new(RawInner {
                fields: RwLock::new(fields),
            }),
        }
    }

    fn identity(&self) -> RawIdentity {
        Arc::as_ptr(&self.inner) as RawIdentity
    }
}

/// A tracked view over a [`RawObject`]'s fields.
pub struct ReactiveObject<V> {
    raw: RawObject<V>,
    id: TargetId,
    mode: WrapMode,
}

impl<V> Clone for ReactiveObject<V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            id: self.id,
            mode: self.mode,
        }
    }
}

impl<V: Clone> ReactiveObject<V> {
    fn wrap(raw: RawObject<V>, mode: WrapMode) -> Self {
        let identity = raw.identity();
        if registry::is_frozen(identity) && !mode.is_readonly() {
            return Self {
                raw,
                id: registry::target_id_for(identity),
                mode: WrapMode::Untracked,
            };
        }
        if registry::is_marked_raw(identity) {
            return Self {
                raw,
                id: registry::target_id_for(identity),
                mode: WrapMode::Untracked,
            };
        }
        let id = registry::target_id_for(identity);
        Self { raw, id, mode }
    }

    /// Read a field, tracking `(target, key)` for the currently active
    /// effect or computed. In a deep-mutable view, nested containers
    /// read through here would themselves need separate `reactive()`
    /// calls at construction time (Rust has no implicit recursive
    /// wrap-on-read the way a `Proxy` does for nested plain objects).
    pub fn get(&self, key: &str) -> Option<V> {
        if self.mode != WrapMode::Untracked {
            registry::track(self.id, Key::Str(Arc::from(key)));
        }
        self.raw.inner.fields.read().get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        if self.mode != WrapMode::Untracked {
            registry::track(self.id, Key::Str(Arc::from(key)));
        }
        self.raw.inner.fields.read().contains_key(key)
    }

    /// All field names, tracking `Iterate` (observing the shape, not any
    /// one field).
    pub fn keys(&self) -> Vec<Arc<str>> {
        if self.mode != WrapMode::Untracked {
            registry::track(self.id, Key::Iterate);
        }
        self.raw.inner.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        if self.mode != WrapMode::Untracked {
            registry::track(self.id, Key::Iterate);
        }
        self.raw.inner.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a field, triggering `Set` if the key already existed or
    /// `Add` (plus `Iterate`) if this creates a new one.
    pub fn set(&self, key: &str, value: V) -> Result<(), ReactiveError>
    where
        V: PartialEq + Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!(key, "write to readonly reactive object ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        if self.mode == WrapMode::Untracked {
            self.raw
                .inner
                .fields
                .write()
                .insert(Arc::from(key), value);
            return Ok(());
        }

        let key_arc: Arc<str> = Arc::from(key);
        let (existed, old_value, changed) = {
            let mut fields = self.raw.inner.fields.write();
            match fields.get(key) {
                Some(old) => {
                    let changed = *old != value;
                    let old_value = old.clone();
                    if changed {
                        fields.insert(key_arc.clone(), value.clone());
                    }
                    (true, Some(old_value), changed)
                }
                None => {
                    fields.insert(key_arc.clone(), value.clone());
                    (false, None, true)
                }
            }
        };

        if !changed {
            return Ok(());
        }

        let mut trigger = Trigger::new(self.id, if existed { TriggerOp::Set } else { TriggerOp::Add })
            .key(Key::Str(key_arc))
            .new_value(value);
        if let Some(old) = old_value {
            trigger = trigger.old_value(old);
        }
        trigger.fire();
        Ok(())
    }

    /// Remove a field, triggering `Delete` (plus `Iterate`) if it
    /// existed.
    pub fn delete(&self, key: &str) -> Result<bool, ReactiveError>
    where
        V: Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!(key, "delete on readonly reactive object ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let removed = self.raw.inner.fields.write().shift_remove(key);
        let existed = removed.is_some();
        if existed && self.mode != WrapMode::Untracked {
            let mut trigger = Trigger::new(self.id, TriggerOp::Delete).key(Key::Str(Arc::from(key)));
            if let Some(old) = removed {
                trigger = trigger.old_value(old);
            }
            trigger.fire();
        }
        Ok(existed)
    }

    pub fn target_id(&self) -> TargetId {
        self.id
    }

    pub fn mode(&self) -> WrapMode {
        self.mode
    }

    pub fn is_reactive(&self) -> bool {
        self.mode.is_reactive()
    }

    pub fn is_readonly(&self) -> bool {
        self.mode.is_readonly()
    }

    pub fn to_raw(&self) -> RawObject<V> {
        self.raw.clone()
    }
}

/// Ref-forwarding seam for a field whose value is itself a [`Ref`].
///
/// Source §4.2's get-trap unwraps a ref-valued property straight to
/// `res.value`, and its set-trap forwards a plain (non-ref) write into
/// the existing ref's `value` rather than replacing the field itself
/// ("old is a Ref and new is not -> mutate old Ref's value, return
/// without a trigger on target[key] - the ref's own trigger fires
/// instead"). A `Proxy` makes that dynamic: any field can turn out to
/// hold a ref at runtime. `ReactiveObject<V>` is monomorphic per field
/// type, so this crate expresses the same rule as a dedicated impl for
/// `V = Ref<T>` instead - a field typed as a ref, accessed through
/// `get_unwrapped`/`set_unwrapped` rather than the generic `get`/`set`.
impl<T: Clone + PartialEq + Send + Sync + 'static> ReactiveObject<Ref<T>> {
    /// Read a ref-valued field, unwrapping to the ref's own value (source
    /// §4.2: "If `res` is a Ref: unwrap to `res.value`"). Tracks both the
    /// object key (via the underlying `get`) and the ref's own dep (via
    /// `Ref::get`), so an effect that reads `obj.get_unwrapped("r")`
    /// re-runs whether the field is later reassigned to a different ref
    /// or the existing ref's value changes directly.
    pub fn get_unwrapped(&self, key: &str) -> Option<T> {
        self.get(key).map(|slot| slot.get())
    }

    /// Write a ref-valued field with a plain value. If the field already
    /// holds a ref, forward into that ref's own `set` instead of
    /// replacing the field (source §4.2: the ref's own trigger fires, not
    /// one on this object key - preserving the original ref's identity
    /// for anyone still holding it directly, per scenario 4). If the
    /// field doesn't exist yet, a fresh ref is created to hold it.
    pub fn set_unwrapped(&self, key: &str, value: T) -> Result<(), ReactiveError> {
        if self.mode.is_readonly() {
            tracing::warn!(key, "write to readonly reactive object ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        match self.get(key) {
            Some(slot) => {
                slot.set(value);
                Ok(())
            }
            None => self.set(key, reactive_ref(value)),
        }
    }
}

/// Mark a raw target so it is never wrapped, regardless of which
/// `reactive()`-family function is later called on it.
pub fn mark_raw<V>(raw: &RawObject<V>) {
    registry::mark_raw(raw.identity());
}

pub fn freeze<V>(raw: &RawObject<V>) {
    registry::freeze(raw.identity());
}

/// Unifies the four wrap entry points across every raw/proxy pair in the
/// crate. Implemented once for each raw newtype (fresh construction) and
/// once for each proxy type (passthrough/promotion, source rules: a
/// readonly view of an already-reactive target stays linked to it; a
/// reactive view of an already-readonly target is rejected in favor of
/// the existing readonly view).
pub trait IntoReactive {
    type Proxy;
    fn into_reactive(self) -> Self::Proxy;
    fn into_readonly(self) -> Self::Proxy;
    fn into_shallow_reactive(self) -> Self::Proxy;
    fn into_shallow_readonly(self) -> Self::Proxy;
}

impl<V: Clone> IntoReactive for RawObject<V> {
    type Proxy = ReactiveObject<V>;

    fn into_reactive(self) -> Self::Proxy {
        ReactiveObject::wrap(self, WrapMode::DeepMutable)
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveObject::wrap(self, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveObject::wrap(self, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveObject::wrap(self, WrapMode::ShallowReadonly)
    }
}

impl<V: Clone> IntoReactive for ReactiveObject<V> {
    type Proxy = ReactiveObject<V>;

    /// Already reactive: `reactive(reactive(x))` returns `x` (source
    /// rule 2).
    fn into_reactive(self) -> Self::Proxy {
        if self.mode == WrapMode::DeepReadonly || self.mode == WrapMode::ShallowReadonly {
            self
        } else {
            ReactiveObject::wrap(self.raw, WrapMode::DeepMutable)
        }
    }

    /// `readonly()` over any existing view always yields a readonly view
    /// of the same underlying target (source rule 3), preserving shared
    /// identity rather than re-deriving from `self`.
    fn into_readonly(self) -> Self::Proxy {
        ReactiveObject::wrap(self.raw, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveObject::wrap(self.raw, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveObject::wrap(self.raw, WrapMode::ShallowReadonly)
    }
}

/// Convenience free function mirroring the source's `reactive()`.
pub fn reactive<T: IntoReactive>(target: T) -> T::Proxy {
    target.into_reactive()
}

pub fn readonly<T: IntoReactive>(target: T) -> T::Proxy {
    target.into_readonly()
}

pub fn shallow_reactive<T: IntoReactive>(target: T) -> T::Proxy {
    target.into_shallow_reactive()
}

pub fn shallow_readonly<T: IntoReactive>(target: T) -> T::Proxy {
    target.into_shallow_readonly()
}
