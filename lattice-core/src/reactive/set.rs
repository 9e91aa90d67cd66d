//! `ReactiveSet`: keyed-collection tracking for a `Set`-like target
//! (presence, not key-value pairs).
//!
//! Structurally a thin specialization of `ReactiveMap<K, ()>` - a set
//! only has keys - but kept as its own type rather than a type alias so
//! its method names (`add`/`has`/`delete`) match the source's `Set` API
//! instead of `Map`'s, and so it has no `MapKeyIterate` distinction
//! (a `Set`'s `Iterate` key already is its key-iteration key).

use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;

use super::error::ReactiveError;
use super::key::{Key, TargetId, TrackableKey, TriggerOp};
use super::object::WrapMode;
use super::registry::{self, RawIdentity, Trigger};

struct RawInner<V> {
    items: RwLock<IndexSet<V>>,
}

pub struct RawSet<V> {
    inner: Arc<RawInner<V>>,
}

impl<V> Clone for RawSet<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Hash + Eq> RawSet<V> {
    pub fn new(items: IndexSet<V>) -> Self {
        Self {
            inner: Arc::new(RawInner {
                items: RwLock::new(items),
            }),
        }
    }

    fn identity(&self) -> RawIdentity {
        Arc::as_ptr(&self.inner) as RawIdentity
    }
}

pub struct ReactiveSet<V> {
    raw: RawSet<V>,
    id: TargetId,
    mode: WrapMode,
}

impl<V> Clone for ReactiveSet<V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            id: self.id,
            mode: self.mode,
        }
    }
}

impl<V: Hash + Eq + TrackableKey + Clone> ReactiveSet<V> {
    fn wrap(raw: RawSet<V>, mode: WrapMode) -> Self {
        let identity = raw.identity();
        if (registry::is_frozen(identity) && !mode.is_readonly()) || registry::is_marked_raw(identity) {
            return Self {
                raw,
                id: registry::target_id_for(identity),
                mode: WrapMode::Untracked,
            };
        }
        let id = registry::target_id_for(identity);
        Self { raw, id, mode }
    }

    fn tracked(&self) -> bool {
        self.mode != WrapMode::Untracked
    }

    pub fn has(&self, value: &V) -> bool {
        if self.tracked() {
            registry::track(self.id, value.track_key());
        }
        self.raw.inner.items.read().contains(value)
    }

    pub fn size(&self) -> usize {
        if self.tracked() {
            registry::track(self.id, Key::Iterate);
        }
        self.raw.inner.items.read().len()
    }

    pub fn values(&self) -> Vec<V> {
        if self.tracked() {
            registry::track(self.id, Key::Iterate);
        }
        self.raw.inner.items.read().iter().cloned().collect()
    }

    pub fn add(&self, value: V) -> Result<(), ReactiveError>
    where
        V: Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let inserted = self.raw.inner.items.write().insert(value.clone());
        if inserted && self.tracked() {
            Trigger::new(self.id, TriggerOp::Add)
                .key(value.track_key())
                .new_value(value)
                .fire();
        }
        Ok(())
    }

    pub fn delete(&self, value: &V) -> Result<bool, ReactiveError> {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let removed = self.raw.inner.items.write().shift_remove(value);
        if removed && self.tracked() {
            Trigger::new(self.id, TriggerOp::Delete)
                .key(value.track_key())
                .fire();
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), ReactiveError> {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let was_empty = self.raw.inner.items.read().is_empty();
        self.raw.inner.items.write().clear();
        if !was_empty && self.tracked() {
            Trigger::new(self.id, TriggerOp::Clear).fire();
        }
        Ok(())
    }

    pub fn target_id(&self) -> TargetId {
        self.id
    }

    pub fn mode(&self) -> WrapMode {
        self.mode
    }

    pub fn to_raw(&self) -> RawSet<V> {
        self.raw.clone()
    }
}

pub fn mark_raw<V>(raw: &RawSet<V>) {
    registry::mark_raw(raw.identity());
}

pub fn freeze<V>(raw: &RawSet<V>) {
    registry::freeze(raw.identity());
}

impl<V: Hash + Eq + TrackableKey + Clone> super::object::IntoReactive for RawSet<V> {
    type Proxy = ReactiveSet<V>;

    fn into_reactive(self) -> Self::Proxy {
        ReactiveSet::wrap(self, WrapMode::DeepMutable)
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveSet::wrap(self, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveSet::wrap(self, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveSet::wrap(self, WrapMode::ShallowReadonly)
    }
}

impl<V: Hash + Eq + TrackableKey + Clone> super::object::IntoReactive for ReactiveSet<V> {
    type Proxy = ReactiveSet<V>;

    fn into_reactive(self) -> Self::Proxy {
        if self.mode.is_readonly() {
            self
        } else {
            ReactiveSet::wrap(self.raw, WrapMode::DeepMutable)
        }
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveSet::wrap(self.raw, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveSet::wrap(self.raw, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveSet::wrap(self.raw, WrapMode::ShallowReadonly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use crate::reactive::object::reactive;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn add_triggers_size_dependents() {
        let s: ReactiveSet<i32> = reactive(RawSet::new(IndexSet::new()));
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let s_clone = s.clone();
        let _runner = effect(
            move || {
                let _ = s_clone.size();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        s.add(1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(s.size(), 1);
    }

    #[test]
    fn duplicate_add_is_a_no_op() {
        let s: ReactiveSet<i32> = reactive(RawSet::new(IndexSet::new()));
        s.add(1).unwrap();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let s_clone = s.clone();
        let _runner = effect(
            move || {
                let _ = s_clone.size();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        s.add(1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
