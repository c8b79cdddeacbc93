//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`: never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod config_service;
pub mod plugin_set;
pub mod preview;
pub mod reconcile;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

/// Bound a collaborator call. Running past `limit` is reported as an error
/// naming `what`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("{what} timed out after {}s", limit.as_secs()),
    }
}
