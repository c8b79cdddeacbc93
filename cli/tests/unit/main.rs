//! Unit tests for converge CLI
//!
//! These tests use in-memory port implementations and run fast without
//! external I/O.

mod helpers;
mod reconcile_service;
mod state_store;
