//! Fine-grained reactive dependency tracking.
//!
//! This module is one dependency graph (`registry`) shared by six
//! front-ends over it: [`Ref`]/[`ShallowRef`], [`Computed`],
//! [`ReactiveObject`], [`ReactiveVec`], [`ReactiveMap`] and
//! [`ReactiveSet`], plus the [`effect`] function that subscribes a
//! closure to whatever any of them read during its run.
//!
//! Typical use:
//!
//! ```
//! use lattice_core::reactive::{effect, reactive_ref, EffectOptions};
//!
//! let count = reactive_ref(0);
//! let count_for_effect = count.clone();
//! effect(move || {
//!     println!("count is {}", count_for_effect.get());
//! }, EffectOptions::default());
//!
//! count.set(1); // prints "count is 1"
//! ```

pub mod computed;
pub mod dep;
pub mod error;
pub mod key;
pub mod map;
pub mod object;
pub mod registry;
pub mod set;
pub mod tracking;
pub mod vec;

mod effect;
mod ref_;

pub use computed::{computed, Computed};
pub use effect::{effect, stop, EffectOptions, EffectRunner, ReactiveEffect, TrackEvent};
pub use error::ReactiveError;
pub use key::{Key, TargetId, TrackOp, TrackableKey, TriggerOp};
pub use map::{RawMap, ReactiveMap};
pub use object::{
    freeze, mark_raw, reactive, readonly, shallow_reactive, shallow_readonly, IntoReactive,
    RawObject, ReactiveObject, WrapMode,
};
pub use ref_::{changed, is_ref, reactive_ref, shallow_ref, ReadonlyRef, Ref, Unref};
pub use registry::{RawIdentity, TargetShape, Trigger, TriggerEvent};
pub use set::{RawSet, ReactiveSet};
pub use tracking::{enable_tracking, is_tracking_enabled, pause_tracking, reset_tracking, untracked, MAX_TRACK_DEPTH};
pub use vec::{RawVec, ReactiveVec};
