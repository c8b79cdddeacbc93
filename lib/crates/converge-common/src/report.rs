//! Outcome of one reconciliation run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The effect ran and modified the managed system or the state store.
    Changed,
    /// The effect ran but reported that nothing needed to change.
    Unchanged,
    /// The precondition said the action was already satisfied.
    Skipped,
}

/// One entry in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub key: String,
    pub outcome: ActionOutcome,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// Error category of the action that stopped a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PreconditionCheckFailed,
    EffectFailed,
    PostconditionWriteFailed,
    SecretResolutionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub action_key: String,
    pub kind: FailureKind,
    pub message: String,
    /// Set when an effect was applied but its marker was not recorded, so a
    /// re-run may apply it a second time.
    pub requires_manual_reconciliation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub actions: Vec<ActionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunReport {
    /// Start an empty report. Status stays `Succeeded` unless `fail` is called.
    #[must_use]
    pub fn begin() -> Self {
        Self {
            status: RunStatus::Succeeded,
            started_at: Utc::now(),
            finished_at: None,
            actions: Vec::new(),
            failure: None,
        }
    }

    pub fn record(&mut self, key: impl Into<String>, outcome: ActionOutcome, detail: impl Into<String>) {
        self.actions.push(ActionRecord {
            key: key.into(),
            outcome,
            detail: detail.into(),
        });
    }

    pub fn fail(&mut self, failure: RunFailure) {
        self.status = RunStatus::Failed;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Number of actions whose effect changed something.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.outcome == ActionOutcome::Changed)
            .count()
    }

    /// Keys of every action that completed (changed, unchanged or skipped).
    #[must_use]
    pub fn completed_keys(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.key.as_str()).collect()
    }

    #[must_use]
    pub fn find(&self, key: &str) -> Option<&ActionRecord> {
        self.actions.iter().find(|a| a.key == key)
    }
}
