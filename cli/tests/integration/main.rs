//! Integration tests for converge CLI
//!
//! These tests spawn the actual binary and test end-to-end behavior of the
//! offline commands. They never contact a server.

mod cli_tests;
mod state_command;
