//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod config;
pub mod digest;
pub mod error;
pub mod keys;
pub mod plan;
pub mod plugins;
pub mod templates;

pub use config::{ConvergeConfig, validate_config_key, validate_config_value};
pub use error::{ConfigError, ReconcileError};
pub use plan::{ActionSpec, Guard, Step, build_plan};
pub use plugins::{CurrentPlugin, InstalledPlugin, PluginAction, PluginPlan, reconcile_plugins};
pub use templates::TemplateId;
