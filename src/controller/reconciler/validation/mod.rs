//! # Validation
//!
//! Spec-level checks that turn malformed input into validation failures.

mod duration;
mod kubernetes;

pub use duration::{parse_kubernetes_duration, validate_duration_interval};
pub use kubernetes::{validate_header_name, validate_kubernetes_name, validate_remote_url};
