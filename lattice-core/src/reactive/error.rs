//! Errors surfaced by the proxy-construction path.
//!
//! Invariant violations (double-wrapping, wrapping a non-object-like
//! value) stay as `debug_assert!`s at their call sites, matching how
//! the source spec itself classifies them as programmer errors rather
//! than recoverable conditions; `ReactiveError` instead covers the
//! handful of states a caller can legitimately hit and should decide
//! how to handle (frozen targets, explicitly skipped targets).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReactiveError {
    #[error("target is frozen and cannot be made reactive or written to")]
    TargetFrozen,

    #[error("target was marked raw and will not be tracked")]
    TargetSkipped,

    #[error("target is not object-like and cannot be wrapped")]
    NotObjectLike,

    /// A write/delete was attempted through a readonly view. The source
    /// spec (§7 item 2) has this warn and silently no-op so non-strict
    /// call sites don't break; Rust's stricter typing makes a `Result`
    /// the idiomatic way to surface the same "state left unchanged"
    /// outcome explicitly rather than pretending to succeed (see
    /// DESIGN.md). The write itself never happens and no `Dep` is ever
    /// touched either way, so source invariant 3 holds regardless.
    #[error("cannot write through a readonly view")]
    ReadonlyWrite,
}
