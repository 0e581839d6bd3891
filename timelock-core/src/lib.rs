//! Core shared library for the timelock scheduler workspace.
//!
//! Exposes the primitives the service and the operator CLI depend on:
//! common errors, environment configuration, database pooling, JSON
//! helpers and logging setup.

pub mod config;
pub mod db;
pub mod errors;
pub mod logging;
pub mod serde_utils;

pub use config::{CoreConfig, Environment};
pub use errors::{ConfigError, CoreError, Result as CoreResult};
