//! # Runtime
//!
//! Process-level plumbing around the reconcile engine.
//!
//! - `initialization`: startup sequence
//! - `watch_loop`: per-kind watch dispatchers
//! - `error_policy`: watch stream error classification
//! - `shutdown`: stop signal and bounded drain

pub mod error_policy;
pub mod initialization;
pub mod shutdown;
pub mod watch_loop;
