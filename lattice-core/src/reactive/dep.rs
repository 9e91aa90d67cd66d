//! Dep: the subscriber set for one (target, key) location.
//!
//! A `Dep` is shared (via `Arc`) between the registry's per-target map and
//! every [`EffectInner`](super::effect::EffectInner) that currently
//! subscribes to it - this is the bidirectional edge the rest of the
//! engine's invariants (§3 invariant 1) are stated in terms of.
//!
//! `w`/`n` are the bitmask fields the dependency-diff algorithm
//! (`effect::EffectInner::run`) uses to tell "tracked before this run"
//! from "tracked during this run" without rebuilding the subscriber set
//! from scratch on every run. See `effect.rs` for the algorithm; this
//! file only owns the data and the small mutations `run`/`track` need.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::effect::EffectInner;
use super::key::Key;

/// Identifies one effect for membership checks inside a `Dep` without
/// needing to upgrade every `Weak` reference.
pub(crate) type EffectId = u64;

pub(crate) struct DepInner {
    /// Subscribing effects, insertion order preserved (source §5:
    /// "effects fire in iteration order of the merged Dep set (insertion
    /// order of subscribers into each Dep)"). Weak so a `Dep` never keeps
    /// an effect alive past the last strong `EffectRunner`/`Computed`
    /// holding it.
    pub(crate) subs: IndexMap<EffectId, Weak<EffectInner>>,
    /// "was tracked" bits, one per nesting depth.
    pub(crate) w: u32,
    /// "newly tracked this run" bits, one per nesting depth.
    pub(crate) n: u32,
}

/// A dependency set for one `(target, key)` pair.
pub struct DepCell {
    pub(crate) inner: Mutex<DepInner>,
    /// Retained for dev-hook / debug purposes only.
    pub(crate) key: Key,
}

impl DepCell {
    pub(crate) fn new(key: Key) -> Self {
        Self {
            inner: Mutex::new(DepInner {
                subs: IndexMap::new(),
                w: 0,
                n: 0,
            }),
            key,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.lock().subs.is_empty()
    }

    pub(crate) fn remove(&self, id: EffectId) {
        self.inner.lock().subs.shift_remove(&id);
    }

    /// Snapshot the live (upgraded) subscribers in insertion order, for
    /// firing by `registry::trigger`.
    pub(crate) fn live_subscribers(&self) -> Vec<Arc<EffectInner>> {
        self.inner
            .lock()
            .subs
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_dep_has_no_subscribers() {
        let dep = DepCell::new(Key::Iterate);
        assert!(dep.is_empty());
        assert!(dep.live_subscribers().is_empty());
    }
}
