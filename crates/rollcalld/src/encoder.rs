//! Detection backend selection.
//!
//! Detection and embedding extraction are pluggable: deployments link
//! a backend by implementing `rollcall_core::FaceEncoder` and adding a
//! match arm here. The built-in `null` backend detects nothing and is
//! used to soak-test camera installs.

use anyhow::bail;
use rollcall_core::{FaceEncoder, NullEncoder};

pub fn build(backend: &str) -> anyhow::Result<Box<dyn FaceEncoder + Send>> {
    match backend {
        "null" => Ok(Box::new(NullEncoder)),
        other => bail!("unknown encoder backend '{other}' (available: null)"),
    }
}
