//! # Custom Resource Definitions
//!
//! CRD types for the Random Secret Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `RandomSecret` specification and default values
//! - `status.rs` - Status types reporting whether the target Secret exists

mod spec;
mod status;

// Re-export all public types
pub use spec::{default_key, default_true, RandomSecret, RandomSecretSpec, SecretLength};
pub use status::{RandomSecretStatus, SecretState};
