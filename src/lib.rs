//! # Random Secret Controller
//!
//! A Kubernetes controller that fills opted-in Secrets with generated random
//! values and never overwrites a value that already exists.
//!
//! Two kinds of resources are managed:
//!
//! 1. **Annotated Secrets** - `secret.a-cup-of.coffee/enable: "true"` plus optional
//!    `key`, `length` and `special-char` annotations
//! 2. **RandomSecret resources** - declarative requests for a Secret to be created
//!
//! Values arrive two ways: synchronously through the mutating admission webhook
//! when a Secret is created, and asynchronously through full sweeps run by the
//! elected leader whenever a watch event arrives.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod webhook;
