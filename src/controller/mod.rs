//! # Controller
//!
//! Core controller modules for the Random Secret Controller.
//!
//! - `generator`: random value generation
//! - `policy`: opt-in and generation parameters, shared by sweeps and the webhook
//! - `leader`: lease-based leader election
//! - `store`: cluster read/write capability
//! - `reconciler`: full-sweep reconciliation per resource kind
//! - `server`: HTTP server for metrics and health checks
//! - `crdgen`: CRD generation utility

pub mod crdgen;
pub mod generator;
pub mod leader;
pub mod policy;
pub mod reconciler;
pub mod server;
pub mod store;
