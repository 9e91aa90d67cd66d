//! `ReactiveMap`: keyed-collection tracking (`Map`-like, as distinct
//! from `ReactiveObject`'s record semantics).
//!
//! The source distinguishes plain objects from `Map`/`Set` because the
//! latter have a `size` getter and a key space that isn't restricted to
//! strings, and because iterating a `Map`'s keys shouldn't depend on its
//! values (`MAP_KEY_ITERATE_KEY` vs `ITERATE_KEY`, source §4.3/§4.4).
//! `ReactiveMap<K, V>` keeps that distinction instead of folding it into
//! `ReactiveObject`.

use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::error::ReactiveError;
use super::key::{Key, TargetId, TrackableKey, TriggerOp};
use super::object::WrapMode;
use super::registry::{self, RawIdentity, TargetShape, Trigger};

struct RawInner<K, V> {
    entries: RwLock<IndexMap<K, V>>,
}

pub struct RawMap<K, V> {
    inner: Arc<RawInner<K, V>>,
}

impl<K, V> Clone for RawMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Hash + Eq, V> RawMap<K, V> {
    pub fn new(entries: IndexMap<K, V>) -> Self {
        Self {
            inner: Arc::new(RawInner {
                entries: RwLock::new(entries),
            }),
        }
    }

    fn identity(&self) -> RawIdentity {
        Arc::as_ptr(&self.inner) as RawIdentity
    }
}

pub struct ReactiveMap<K, V> {
    raw: RawMap<K, V>,
    id: TargetId,
    mode: WrapMode,
}

impl<K, V> Clone for ReactiveMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            id: self.id,
            mode: self.mode,
        }
    }
}

impl<K: Hash + Eq + TrackableKey + Clone, V: Clone> ReactiveMap<K, V> {
    fn wrap(raw: RawMap<K, V>, mode: WrapMode) -> Self {
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

    pub fn get(&self, key: &K) -> Option<V> {
        if self.tracked() {
            registry::track(self.id, key.track_key());
        }
        self.raw.inner.entries.read().get(key).cloned()
    }

    pub fn has(&self, key: &K) -> bool {
        if self.tracked() {
            registry::track(self.id, key.track_key());
        }
        self.raw.inner.entries.read().contains_key(key)
    }

    /// Tracks `Iterate`: the size depends on every insert/delete, same
    /// as iterating the whole map would.
    pub fn size(&self) -> usize {
        if self.tracked() {
            registry::track(self.id, Key::Iterate);
        }
        self.raw.inner.entries.read().len()
    }

    /// Tracks `MapKeyIterate` only: a consumer that walks keys but never
    /// reads values shouldn't re-run when an existing key's value
    /// changes, only when keys are added or removed.
    pub fn keys(&self) -> Vec<K> {
        if self.tracked() {
            registry::track(self.id, Key::MapKeyIterate);
        }
        self.raw.inner.entries.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        if self.tracked() {
            registry::track(self.id, Key::Iterate);
        }
        self.raw
            .inner
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set(&self, key: K, value: V) -> Result<(), ReactiveError>
    where
        V: PartialEq + Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let (existed, changed) = {
            let mut entries = self.raw.inner.entries.write();
            match entries.get(&key) {
                Some(old) if *old == value => (true, false),
                Some(_) => {
                    entries.insert(key.clone(), value.clone());
                    (true, true)
                }
                None => {
                    entries.insert(key.clone(), value.clone());
                    (false, true)
                }
            }
        };
        if !changed || !self.tracked() {
            return Ok(());
        }
        Trigger::new(self.id, if existed { TriggerOp::Set } else { TriggerOp::Add })
            .key(key.track_key())
            .shape(TargetShape::Map)
            .new_value(value)
            .fire();
        Ok(())
    }

    pub fn delete(&self, key: &K) -> Result<bool, ReactiveError>
    where
        V: Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let removed = self.raw.inner.entries.write().shift_remove(key);
        let existed = removed.is_some();
        if existed && self.tracked() {
            let mut trigger = Trigger::new(self.id, TriggerOp::Delete)
                .key(key.track_key())
                .shape(TargetShape::Map);
            if let Some(old) = removed {
                trigger = trigger.old_value(old);
            }
            trigger.fire();
        }
        Ok(existed)
    }

    pub fn clear(&self) -> Result<(), ReactiveError> {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let was_empty = self.raw.inner.entries.read().is_empty();
        self.raw.inner.entries.write().clear();
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

    pub fn to_raw(&self) -> RawMap<K, V> {
        self.raw.clone()
    }
}

pub fn mark_raw<K, V>(raw: &RawMap<K, V>) {
    registry::mark_raw(raw.identity());
}

pub fn freeze<K, V>(raw: &RawMap<K, V>) {
    registry::freeze(raw.identity());
}

impl<K: Hash + Eq + TrackableKey + Clone, V: Clone> super::object::IntoReactive for RawMap<K, V> {
    type Proxy = ReactiveMap<K, V>;

    fn into_reactive(self) -> Self::Proxy {
        ReactiveMap::wrap(self, WrapMode::DeepMutable)
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveMap::wrap(self, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveMap::wrap(self, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveMap::wrap(self, WrapMode::ShallowReadonly)
    }
}

impl<K: Hash + Eq + TrackableKey + Clone, V: Clone> super::object::IntoReactive for ReactiveMap<K, V> {
    type Proxy = ReactiveMap<K, V>;

    fn into_reactive(self) -> Self::Proxy {
        if self.mode.is_readonly() {
            self
        } else {
            ReactiveMap::wrap(self.raw, WrapMode::DeepMutable)
        }
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveMap::wrap(self.raw, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveMap::wrap(self.raw, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveMap::wrap(self.raw, WrapMode::ShallowReadonly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use crate::reactive::object::reactive;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn raw_map() -> RawMap<String, i32> {
        let mut entries = IndexMap::new();
        entries.insert("a".to_string(), 1);
        RawMap::new(entries)
    }

    #[test]
    fn keys_does_not_rerun_on_value_change() {
        let m = reactive(raw_map());
        let key_runs = Arc::new(AtomicI32::new(0));
        let key_runs_clone = key_runs.clone();
        let m_clone = m.clone();
        let _runner = effect(
            move || {
                let _ = m_clone.keys();
                key_runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(key_runs.load(Ordering::SeqCst), 1);
        m.set("a".to_string(), 2).unwrap();
        assert_eq!(key_runs.load(Ordering::SeqCst), 1);
        m.set("b".to_string(), 1).unwrap();
        assert_eq!(key_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn entries_reruns_on_existing_key_value_change() {
        let m = reactive(raw_map());
        let entry_runs = Arc::new(AtomicI32::new(0));
        let entry_runs_clone = entry_runs.clone();
        let m_clone = m.clone();
        let _runner = effect(
            move || {
                let _ = m_clone.entries();
                entry_runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(entry_runs.load(Ordering::SeqCst), 1);
        m.set("a".to_string(), 2).unwrap();
        assert_eq!(entry_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_fires_on_nonempty_map() {
        let m = reactive(raw_map());
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let m_clone = m.clone();
        let _runner = effect(
            move || {
                let _ = m_clone.size();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        m.clear().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(m.size(), 0);
    }
}
