pub mod desired;
pub mod records;
pub mod report;

pub use desired::{
    AutomationUser, BootstrapJob, CredentialKind, CredentialSpec, DesiredState, DesiredStateError,
    SettingKey, SettingValue, validate_identifier,
};
pub use records::{CompletionFlag, PinRecord, SecretRecord};
pub use report::{ActionOutcome, ActionRecord, FailureKind, RunFailure, RunReport, RunStatus};
