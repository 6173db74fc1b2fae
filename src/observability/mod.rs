//! # Observability
//!
//! Prometheus metrics collection. Logging goes through `tracing` directly.
//!
//! - `metrics`: Prometheus metrics collection

pub mod metrics;

// Re-export for convenience
pub use metrics::*;
