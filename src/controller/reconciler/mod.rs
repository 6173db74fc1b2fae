//! # Reconciler
//!
//! Full-sweep reconciliation for the two managed kinds.
//!
//! A sweep lists every object of one kind, keeps the managed ones and writes a
//! generated value where none exists yet. Sweeps are idempotent: an object that
//! already carries a value is skipped, so running the same sweep twice (or on a
//! redelivered event) never changes a stored value.
//!
//! ## Sweep Flow
//!
//! 1. Check leadership (a non-leader never starts a sweep)
//! 2. List all objects of the kind; a list failure aborts the sweep
//! 3. For each object: evaluate policy, skip if handled, otherwise write
//! 4. Per-object failures are logged and counted, the sweep continues
//!
//! - `Secret`: annotated Secrets receive the value in place
//! - `RandomSecret`: the target Secret is created iff absent, then status is
//!   written (`Ready` or `NotReady`)

mod random_secrets;
mod secrets;
pub mod types;

pub use types::{Reconciler, ReconcilerError, ResourceKind, SweepReport, SweepTrigger};
