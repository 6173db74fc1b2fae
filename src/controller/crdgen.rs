//! # CRD Generator
//!
//! Generates the `RandomSecret` CustomResourceDefinition YAML from the Rust
//! type definitions. The `crdgen` binary prints it.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/randomsecret.yaml
//!
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use crate::crd::RandomSecret;
use kube::core::CustomResourceExt;

/// Render the CRD as a YAML document with the generated-file header
pub fn render() -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(&RandomSecret::crd())?;
    Ok(format!(
        "# This file is auto-generated by crdgen\n\
         # DO NOT EDIT THIS FILE MANUALLY\n\
         # Change the types in src/crd/ and regenerate\n\
         ---\n\
         {yaml}"
    ))
}
