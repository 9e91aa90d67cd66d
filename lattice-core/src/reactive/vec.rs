//! `ReactiveVec`: index/length tracking for a sequence-shaped target.
//!
//! Two behaviors make sequences the trickiest container in the source
//! design, and both are carried over here:
//!
//! - Writing past the end or calling `push` bumps `length`, which is
//!   itself a tracked key (`Key::Length`); shrinking (`truncate`,
//!   `pop` past an observed index) additionally fires every integer-index
//!   dep at or beyond the new length, since those slots are now gone
//!   (source §4.4's length-shrink special case, `registry::Trigger::shrink_from`).
//! - The length-mutator methods (`push`, `pop`, `truncate`) read the
//!   current length internally; if that read weren't suppressed, calling
//!   `push` inside an effect that doesn't otherwise read length would
//!   create a spurious self-dependency. `tracking::untracked` is used
//!   for exactly these internal reads.

use std::sync::Arc;

use parking_lot::RwLock;

use super::key::{Key, TargetId, TriggerOp};
use super::object::WrapMode;
use super::registry::{self, RawIdentity, TargetShape, Trigger};
use super::tracking;

struct RawInner<V> {
    items: RwLock<Vec<V>>,
}

pub struct RawVec<V> {
    inner: Arc<RawInner<V>>,
}

impl<V> Clone for RawVec<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> RawVec<V> {
    pub fn new(items: Vec<V>) -> Self {
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

pub struct ReactiveVec<V> {
    raw: RawVec<V>,
    id: TargetId,
    mode: WrapMode,
}

impl<V> Clone for ReactiveVec<V> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            id: self.id,
            mode: self.mode,
        }
    }
}

impl<V: Clone> ReactiveVec<V> {
    fn wrap(raw: RawVec<V>, mode: WrapMode) -> Self {
        let identity = raw.identity();
        if registry::is_frozen(identity) && !mode.is_readonly() || registry::is_marked_raw(identity) {
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

    pub fn get(&self, index: usize) -> Option<V> {
        if self.tracked() {
            registry::track(self.id, Key::Int(index as i64));
        }
        self.raw.inner.items.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        if self.tracked() {
            registry::track(self.id, Key::Length);
        }
        self.raw.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the whole sequence, tracking `Iterate` (observing shape
    /// and every element, the way `for...of` does in the source).
    pub fn to_vec(&self) -> Vec<V> {
        if self.tracked() {
            registry::track(self.id, Key::Iterate);
            registry::track(self.id, Key::Length);
        }
        self.raw.inner.items.read().clone()
    }

    fn raw_len(&self) -> usize {
        tracking::untracked(|| self.raw.inner.items.read().len())
    }

    pub fn set(&self, index: usize, value: V) -> Result<(), super::error::ReactiveError>
    where
        V: PartialEq + Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(super::error::ReactiveError::ReadonlyWrite);
        }
        let len_before = self.raw_len();
        let is_new_index = index >= len_before;

        let changed = {
            let mut items = self.raw.inner.items.write();
            if index >= items.len() {
                items.resize_with(index + 1, || value.clone());
                items[index] = value.clone();
                true
            } else if items[index] != value {
                items[index] = value.clone();
                true
            } else {
                false
            }
        };

        if !self.tracked() || !changed {
            return Ok(());
        }

        // `Add` on a sequence already fires `Length` via `registry::Trigger`'s
        // resolution table (source §4.4); a second explicit `Length`
        // trigger here would double-fire any effect subscribed only to
        // `length`.
        Trigger::new(self.id, if is_new_index { TriggerOp::Add } else { TriggerOp::Set })
            .key(Key::Int(index as i64))
            .shape(TargetShape::Sequence)
            .new_value(value)
            .fire();
        Ok(())
    }

    pub fn push(&self, value: V) -> Result<(), super::error::ReactiveError>
    where
        V: PartialEq + Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(super::error::ReactiveError::ReadonlyWrite);
        }
        let index = self.raw_len();
        self.raw.inner.items.write().push(value.clone());
        if self.tracked() {
            // `Add` on a sequence already fires `Length` via
            // `registry::Trigger`'s resolution table (source §4.4); no
            // separate `Length` trigger is needed here.
            Trigger::new(self.id, TriggerOp::Add)
                .key(Key::Int(index as i64))
                .shape(TargetShape::Sequence)
                .new_value(value)
                .fire();
        }
        Ok(())
    }

    pub fn pop(&self) -> Result<Option<V>, super::error::ReactiveError>
    where
        V: Send + Sync + 'static,
    {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(super::error::ReactiveError::ReadonlyWrite);
        }
        let popped = self.raw.inner.items.write().pop();
        if popped.is_some() && self.tracked() {
            let new_len = self.raw_len();
            Trigger::new(self.id, TriggerOp::Set)
                .key(Key::Length)
                .shape(TargetShape::Sequence)
                .shrink_from(new_len as i64)
                .fire();
        }
        Ok(popped)
    }

    /// Shrink the sequence to `new_len`, firing `Length` plus every
    /// tracked index at or beyond it.
    pub fn truncate(&self, new_len: usize) -> Result<(), super::error::ReactiveError> {
        if self.mode.is_readonly() {
            tracing::warn!("write to readonly reactive container ignored");
            return Err(super::error::ReactiveError::ReadonlyWrite);
        }
        let old_len = self.raw_len();
        if new_len >= old_len {
            return Ok(());
        }
        self.raw.inner.items.write().truncate(new_len);
        if self.tracked() {
            Trigger::new(self.id, TriggerOp::Set)
                .key(Key::Length)
                .shape(TargetShape::Sequence)
                .shrink_from(new_len as i64)
                .fire();
        }
        Ok(())
    }

    pub fn target_id(&self) -> TargetId {
        self.id
    }

    pub fn mode(&self) -> WrapMode {
        self.mode
    }

    pub fn to_raw(&self) -> RawVec<V> {
        self.raw.clone()
    }
}

/// `includes`/`indexOf`-style lookup that retries without identity
/// translation first - the source's array instrumentation retries a
/// failed `includes` search using the raw (un-proxied) elements, since a
/// caller might be holding a raw value while the array holds reactive
/// proxies of the "same" logical items. With concrete value types this
/// degenerates to an ordinary linear search, but the method is kept
/// under this name so callers migrating from the source API land on a
/// method that still tracks `Iterate` the same way.
impl<V: Clone + PartialEq> ReactiveVec<V> {
    pub fn includes(&self, needle: &V) -> bool {
        if self.tracked() {
            registry::track(self.id, Key::Iterate);
        }
        self.raw.inner.items.read().iter().any(|item| item == needle)
    }
}

pub fn mark_raw<V>(raw: &RawVec<V>) {
    registry::mark_raw(raw.identity());
}

pub fn freeze<V>(raw: &RawVec<V>) {
    registry::freeze(raw.identity());
}

impl<V: Clone> super::object::IntoReactive for RawVec<V> {
    type Proxy = ReactiveVec<V>;

    fn into_reactive(self) -> Self::Proxy {
        ReactiveVec::wrap(self, WrapMode::DeepMutable)
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveVec::wrap(self, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveVec::wrap(self, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveVec::wrap(self, WrapMode::ShallowReadonly)
    }
}

impl<V: Clone> super::object::IntoReactive for ReactiveVec<V> {
    type Proxy = ReactiveVec<V>;

    fn into_reactive(self) -> Self::Proxy {
        if self.mode.is_readonly() {
            self
        } else {
            ReactiveVec::wrap(self.raw, WrapMode::DeepMutable)
        }
    }

    fn into_readonly(self) -> Self::Proxy {
        ReactiveVec::wrap(self.raw, WrapMode::DeepReadonly)
    }

    fn into_shallow_reactive(self) -> Self::Proxy {
        ReactiveVec::wrap(self.raw, WrapMode::ShallowMutable)
    }

    fn into_shallow_readonly(self) -> Self::Proxy {
        ReactiveVec::wrap(self.raw, WrapMode::ShallowReadonly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use crate::reactive::object::reactive;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn push_bumps_length_and_triggers_length_dep() {
        let v = reactive(RawVec::new(vec![1, 2, 3]));
        let len_runs = Arc::new(AtomicI32::new(0));
        let len_runs_clone = len_runs.clone();
        let v_clone = v.clone();
        let _runner = effect(
            move || {
                let _ = v_clone.len();
                len_runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(len_runs.load(Ordering::SeqCst), 1);
        v.push(4).unwrap();
        assert_eq!(len_runs.load(Ordering::SeqCst), 2);
        assert_eq!(v.len(), 4);
    }

    #[test]
    fn truncate_triggers_indices_beyond_new_length() {
        let v = reactive(RawVec::new(vec![1, 2, 3, 4]));
        let idx_runs = Arc::new(AtomicI32::new(0));
        let idx_runs_clone = idx_runs.clone();
        let v_clone = v.clone();
        let _runner = effect(
            move || {
                let _ = v_clone.get(3);
                idx_runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(idx_runs.load(Ordering::SeqCst), 1);
        v.truncate(2).unwrap();
        assert_eq!(idx_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_within_bounds_does_not_touch_length() {
        let v = reactive(RawVec::new(vec![1, 2, 3]));
        let len_runs = Arc::new(AtomicI32::new(0));
        let len_runs_clone = len_runs.clone();
        let v_clone = v.clone();
        let _runner = effect(
            move || {
                let _ = v_clone.len();
                len_runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        v.set(0, 99).unwrap();
        assert_eq!(len_runs.load(Ordering::SeqCst), 1);
    }
}
