//! Harbor Core Library
//!
//! This crate provides the worker configuration, cache namespace model, and
//! configuration errors shared by the Harbor crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{NotificationConfig, WorkerConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::{CacheNamespace, NamespaceKind};
