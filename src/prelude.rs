//! # Prelude
//!
//! Re-exports commonly used types.
//!
//! ```rust
//! use random_secret_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconcile engine and the capabilities it is built from
pub use crate::controller::leader::{LeaderElector, LeaseBackend, LeaseSettings};
pub use crate::controller::policy::{GenerationPolicy, PolicyDecision};
pub use crate::controller::reconciler::{
    Reconciler, ReconcilerError, ResourceKind, SweepReport, SweepTrigger,
};
pub use crate::controller::store::{ClusterStore, StoreError};

// Config types
pub use crate::config::{ControllerConfig, ServerConfig};

// Shutdown plumbing
pub use crate::runtime::shutdown::{ShutdownCoordinator, ShutdownSignal};
