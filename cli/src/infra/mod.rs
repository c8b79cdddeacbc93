//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the
//! jenkins-cli adapter, marker files, secret bags, templates and config.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod command_runner;
pub mod config;
pub mod desired;
pub mod fs;
pub mod jenkins;
pub mod secrets;
pub mod state;
pub mod templates;
