//! # Configuration
//!
//! Operator configuration loaded once at startup from environment variables.
//!
//! - [`ControllerConfig`]: reconcile scheduling, images, logging
//! - [`ServerConfig`]: metrics/probe server

pub mod controller;
pub mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;
