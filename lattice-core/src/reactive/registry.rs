//! The dependency registry: target identity assignment plus the
//! `track`/`trigger` entry points every container module calls through.
//!
//! There is exactly one registry per process, reached through the
//! free functions in this module rather than an explicit handle - this
//! mirrors the source's single global `targetMap`, and is the one piece
//! of genuinely global (not thread-local) state in the crate, since
//! dependency graphs are shared across threads even though the active-
//! effect stack (`tracking.rs`) is per-thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};

use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;

use super::dep::DepCell;
use super::effect::track_dep;
use super::key::{Key, TargetId, TriggerOp};

type TargetDeps = RwLock<std::collections::HashMap<Key, Arc<DepCell>>>;

struct Registry {
    /// TargetId -> (Key -> Dep). One entry per reactive container,
    /// shared by every wrap-mode view over the same raw storage.
    deps: DashMap<TargetId, TargetDeps>,
    /// Raw storage pointer -> TargetId, so every `IntoReactive` impl
    /// asks for "the" id of a given allocation instead of minting a
    /// fresh one per wrap call (source §3 identity invariant).
    ids: DashMap<usize, TargetId>,
    /// Targets explicitly excluded from tracking entirely (`mark_raw`).
    raw_marked: DashSet<usize>,
    /// Targets frozen against writes (`Object.freeze` equivalent).
    frozen: DashSet<usize>,
}

impl Registry {
    fn new() -> Self {
        Self {
            deps: DashMap::new(),
            ids: DashMap::new(),
            raw_marked: DashSet::new(),
            frozen: DashSet::new(),
        }
    }
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// The identity of a raw allocation, used both as the de-dup key for
/// `TargetId` assignment and as the key for the raw/frozen side-tables.
///
/// Every container's raw newtype hands in the address of its backing
/// `Arc` allocation (`Arc::as_ptr(&self.0) as usize`) - stable for the
/// allocation's lifetime and unique among live allocations, which is all
/// the identity invariant needs.
pub type RawIdentity = usize;

/// Look up or assign the [`TargetId`] for a raw allocation identity.
/// Every wrap-mode view over the same allocation resolves to the same
/// id, so a `readonly(reactive(x))` view shares its dependency graph
/// with the `reactive(x)` it wraps.
pub(crate) fn target_id_for(raw: RawIdentity) -> TargetId {
    if let Some(existing) = registry().ids.get(&raw) {
        return *existing;
    }
    let id = TargetId::new();
    registry().ids.entry(raw).or_insert(id);
    *registry().ids.get(&raw).unwrap()
}

pub(crate) fn mark_raw(raw: RawIdentity) {
    registry().raw_marked.insert(raw);
}

pub(crate) fn is_marked_raw(raw: RawIdentity) -> bool {
    registry().raw_marked.contains(&raw)
}

pub(crate) fn freeze(raw: RawIdentity) {
    registry().frozen.insert(raw);
}

pub(crate) fn is_frozen(raw: RawIdentity) -> bool {
    registry().frozen.contains(&raw)
}

fn dep_for(target: TargetId, key: Key) -> Arc<DepCell> {
    let shard = registry()
        .deps
        .entry(target)
        .or_insert_with(|| RwLock::new(std::collections::HashMap::new()));
    if let Some(dep) = shard.read().get(&key) {
        return dep.clone();
    }
    let mut write = shard.write();
    write
        .entry(key.clone())
        .or_insert_with(|| Arc::new(DepCell::new(key)))
        .clone()
}

fn existing_dep(target: TargetId, key: &Key) -> Option<Arc<DepCell>> {
    registry()
        .deps
        .get(&target)
        .and_then(|shard| shard.read().get(key).cloned())
}

fn all_deps(target: TargetId) -> Vec<Arc<DepCell>> {
    registry()
        .deps
        .get(&target)
        .map(|shard| shard.read().values().cloned().collect())
        .unwrap_or_default()
}

/// Every tracked key that is an integer index `>= from`, used by the
/// sequence length-shrink special case.
fn int_keys_at_or_above(target: TargetId, from: i64) -> Vec<Arc<DepCell>> {
    registry()
        .deps
        .get(&target)
        .map(|shard| {
            shard
                .read()
                .iter()
                .filter_map(|(k, dep)| match k {
                    Key::Int(i) if *i >= from => Some(dep.clone()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Record a dependency on `(target, key)` against the currently active
/// effect, if tracking is enabled and an effect is active. A no-op
/// outside any effect/computed run.
pub fn track(target: TargetId, key: Key) {
    let dep = dep_for(target, key.clone());
    track_dep(&dep, target, key);
}

/// Record presence/absence of a dependency on `(target, key)` without
/// forcing a `Dep` allocation when nothing is tracking - used by read
/// paths that want to avoid registry writes on the hot untracked path.
pub(crate) fn is_tracking_anyone(target: TargetId, key: &Key) -> bool {
    existing_dep(target, key).is_some_and(|dep| !dep.is_empty())
}

/// A `(target, key)` pair slated to fire as part of one `trigger` call,
/// deduplicated by identity so a dep reachable through more than one
/// path (e.g. both its own key and `ITERATE_KEY`) only contributes one
/// copy of its subscribers to the fan-out.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub target: TargetId,
    pub op: TriggerOp,
    pub key: Option<Key>,
    pub new_value: Option<Arc<dyn std::any::Any + Send + Sync>>,
    pub old_value: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

/// Whether a target behaves like a sequence (array index semantics for
/// `Add`/length shrink) or a keyed mapping (`MapKeyIterate` fan-out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    Sequence,
    Map,
    Other,
}

/// Builds up the set of `Dep`s one mutation should fire, following the
/// resolution table: `Clear` fires every dep on the target; a sequence
/// length write additionally fires every integer-index dep at or past
/// the new length; `Add`/`Delete` on a keyed target additionally fire
/// `Iterate`/`MapKeyIterate`.
pub struct Trigger {
    target: TargetId,
    op: TriggerOp,
    key: Option<Key>,
    shape: TargetShape,
    shrink_from: Option<i64>,
    new_value: Option<Arc<dyn std::any::Any + Send + Sync>>,
    old_value: Option<Arc<dyn std::any::Any + Send + Sync>>,
    allow_recurse: bool,
}

impl Trigger {
    pub fn new(target: TargetId, op: TriggerOp) -> Self {
        Self {
            target,
            op,
            key: None,
            shape: TargetShape::Other,
            shrink_from: None,
            new_value: None,
            old_value: None,
            allow_recurse: false,
        }
    }

    pub fn key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    pub fn shape(mut self, shape: TargetShape) -> Self {
        self.shape = shape;
        self
    }

    /// Set when this is a sequence length write; `from` is the new
    /// length, so indices `>= from` are the ones being truncated away.
    pub fn shrink_from(mut self, from: i64) -> Self {
        self.shrink_from = Some(from);
        self
    }

    pub fn new_value<T: std::any::Any + Send + Sync>(mut self, value: T) -> Self {
        self.new_value = Some(Arc::new(value));
        self
    }

    pub fn old_value<T: std::any::Any + Send + Sync>(mut self, value: T) -> Self {
        self.old_value = Some(Arc::new(value));
        self
    }

    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// Resolve the set of deps this mutation touches and fire every live
    /// subscriber, in dep-list order then per-dep insertion order,
    /// deduplicated by effect identity, each isolated from the others by
    /// `catch_unwind` so one effect panicking doesn't stop the rest.
    pub fn fire(self) {
        let deps = self.resolve_deps();
        if deps.is_empty() {
            return;
        }

        let mut seen = std::collections::HashSet::new();
        let mut ordered = Vec::new();
        for dep in &deps {
            for sub in dep.live_subscribers() {
                if seen.insert(sub.id()) {
                    ordered.push(sub);
                }
            }
        }

        let event = TriggerEvent {
            target: self.target,
            op: self.op,
            key: self.key.clone(),
            new_value: self.new_value.clone(),
            old_value: self.old_value.clone(),
        };

        for sub in ordered {
            if super::tracking::is_on_active_stack(&sub) && !self.allow_recurse {
                continue;
            }
            if let Some(on_trigger) = &sub.on_trigger {
                on_trigger(&event);
            }
            let result = catch_unwind(AssertUnwindSafe(|| sub.schedule_or_run()));
            if result.is_err() {
                tracing::error!(
                    effect = sub.id(),
                    target = self.target.raw(),
                    "subscriber panicked while handling trigger; continuing with remaining subscribers"
                );
            }
        }
    }

    fn resolve_deps(&self) -> Vec<Arc<DepCell>> {
        if self.op == TriggerOp::Clear {
            return all_deps(self.target);
        }

        let mut deps = Vec::new();

        if let Some(key) = &self.key {
            if let Some(dep) = existing_dep(self.target, key) {
                deps.push(dep);
            }
        }

        if let Some(from) = self.shrink_from {
            if self.shape == TargetShape::Sequence {
                if let Some(dep) = existing_dep(self.target, &Key::Length) {
                    deps.push(dep);
                }
                deps.extend(int_keys_at_or_above(self.target, from));
                return dedup_by_ptr(deps);
            }
        }

        match (self.op, self.shape) {
            (TriggerOp::Add, TargetShape::Sequence) => {
                if let Some(dep) = existing_dep(self.target, &Key::Length) {
                    deps.push(dep);
                }
                if let Some(dep) = existing_dep(self.target, &Key::Iterate) {
                    deps.push(dep);
                }
            }
            (TriggerOp::Add, TargetShape::Map) => {
                if let Some(dep) = existing_dep(self.target, &Key::Iterate) {
                    deps.push(dep);
                }
                if let Some(dep) = existing_dep(self.target, &Key::MapKeyIterate) {
                    deps.push(dep);
                }
            }
            (TriggerOp::Add, TargetShape::Other) => {
                if let Some(dep) = existing_dep(self.target, &Key::Iterate) {
                    deps.push(dep);
                }
            }
            (TriggerOp::Delete, TargetShape::Map) => {
                if let Some(dep) = existing_dep(self.target, &Key::Iterate) {
                    deps.push(dep);
                }
                if let Some(dep) = existing_dep(self.target, &Key::MapKeyIterate) {
                    deps.push(dep);
                }
            }
            (TriggerOp::Delete, _) => {
                if let Some(dep) = existing_dep(self.target, &Key::Iterate) {
                    deps.push(dep);
                }
            }
            (TriggerOp::Set, TargetShape::Map) => {
                // Changing an existing key's value still touches anything
                // that iterated the map's entries/values (source §4.4:
                // "SET on mapping -> ITERATE_KEY"); it does not touch
                // MapKeyIterate since the key set itself didn't change.
                if let Some(dep) = existing_dep(self.target, &Key::Iterate) {
                    deps.push(dep);
                }
            }
            _ => {}
        }

        dedup_by_ptr(deps)
    }
}

fn dedup_by_ptr(deps: Vec<Arc<DepCell>>) -> Vec<Arc<DepCell>> {
    let mut seen = std::collections::HashSet::new();
    deps.into_iter()
        .filter(|dep| seen.insert(Arc::as_ptr(dep) as usize))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::{effect, EffectOptions};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn target_id_is_stable_per_raw_identity() {
        let raw: RawIdentity = 0x1000;
        let a = target_id_for(raw);
        let b = target_id_for(raw);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_raw_identities_get_distinct_ids() {
        let a = target_id_for(0x2000);
        let b = target_id_for(0x2001);
        assert_ne!(a, b);
    }

    #[test]
    fn track_then_trigger_reruns_subscriber() {
        let target = target_id_for(0x3000);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let _runner = effect(
            move || {
                track(target, Key::Str(Arc::from("value")));
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        Trigger::new(target, TriggerOp::Set)
            .key(Key::Str(Arc::from("value")))
            .fire();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_fires_every_dep_on_target() {
        let target = target_id_for(0x4000);
        let a_runs = Arc::new(AtomicI32::new(0));
        let b_runs = Arc::new(AtomicI32::new(0));
        let (a_clone, b_clone) = (a_runs.clone(), b_runs.clone());
        let _a = effect(
            move || {
                track(target, Key::Str(Arc::from("a")));
                a_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        let _b = effect(
            move || {
                track(target, Key::Str(Arc::from("b")));
                b_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );

        Trigger::new(target, TriggerOp::Clear).fire();
        assert_eq!(a_runs.load(Ordering::SeqCst), 2);
        assert_eq!(b_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn length_shrink_fires_truncated_indices() {
        let target = target_id_for(0x5000);
        let idx2_runs = Arc::new(AtomicI32::new(0));
        let idx2_clone = idx2_runs.clone();
        let _runner = effect(
            move || {
                track(target, Key::Int(2));
                idx2_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        assert_eq!(idx2_runs.load(Ordering::SeqCst), 1);

        Trigger::new(target, TriggerOp::Set)
            .key(Key::Length)
            .shape(TargetShape::Sequence)
            .shrink_from(1)
            .fire();
        assert_eq!(idx2_runs.load(Ordering::SeqCst), 2);
    }
}
