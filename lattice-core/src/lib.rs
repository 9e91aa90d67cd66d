//! Lattice Core
//!
//! This crate provides the fine-grained reactive value system at the
//! heart of Lattice: automatic dependency tracking over refs, computed
//! values, and reactive objects/sequences/maps/sets, plus the effects
//! that subscribe to them. It has no opinion about UI, rendering, or
//! transport - it is the same dependency-tracking engine that a
//! declarative UI layer would sit on top of, kept independent so it can
//! be embedded anywhere incremental recomputation is useful.
//!
//! # Architecture
//!
//! - `reactive`: dependency tracking, effects, refs, computed values,
//!   and the four reactive container types (object/vec/map/set)
//!
//! # Example
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

pub mod reactive;
