//! CLI error types and exit codes

use bizdesk_core::ParseIdError;
use bizdesk_integrity::{IntegrityError, PlanError, RegistryError, SnapshotError};
use bizdesk_store::StoreError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Store error
/// - 4: Validation or configuration error
/// - 5: Repair finished with failed actions
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Repair finished with {failed} failed action(s)")]
    RepairFailed { failed: usize },

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Store(_) => 3,
            CliError::Validation(_) | CliError::Config(_) => 4,
            CliError::RepairFailed { .. } => 5,
            CliError::Io(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::RepairFailed { .. } => {
                Some("Run 'bizdesk-integrity scan' to see what is still flagged.")
            }
            CliError::Store(_) => Some("Check that the dataset file exists and is valid JSON."),
            _ => None,
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e.to_string())
    }
}

impl From<IntegrityError> for CliError {
    fn from(e: IntegrityError) -> Self {
        match e {
            IntegrityError::Snapshot(SnapshotError::DependencyUnavailable { .. })
            | IntegrityError::Snapshot(SnapshotError::TaskFailed { .. }) => {
                CliError::Store(e.to_string())
            }
            IntegrityError::Config(_) | IntegrityError::Registry(_) => {
                CliError::Config(e.to_string())
            }
            IntegrityError::Plan(_) => CliError::Validation(e.to_string()),
        }
    }
}

impl From<PlanError> for CliError {
    fn from(e: PlanError) -> Self {
        CliError::Validation(e.to_string())
    }
}

impl From<RegistryError> for CliError {
    fn from(e: RegistryError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<bizdesk_integrity::ConfigError> for CliError {
    fn from(e: bizdesk_integrity::ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ParseIdError> for CliError {
    fn from(e: ParseIdError) -> Self {
        CliError::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON encoding failed: {e}"))
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::Config(format!("Invalid rules file: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Store("x".to_string()).exit_code(), 3);
        assert_eq!(CliError::Validation("x".to_string()).exit_code(), 4);
        assert_eq!(CliError::Config("x".to_string()).exit_code(), 4);
        assert_eq!(CliError::RepairFailed { failed: 1 }.exit_code(), 5);
        assert_eq!(CliError::Io("x".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_integrity_error_mapping() {
        let err: CliError = IntegrityError::Snapshot(SnapshotError::DependencyUnavailable {
            entity: "Employee".to_string(),
            source: StoreError::Unavailable {
                message: "down".to_string(),
            },
        })
        .into();
        assert_eq!(err.exit_code(), 3);

        let err: CliError = IntegrityError::Plan(PlanError::EmptySelection).into();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_store_error_message() {
        let err: CliError = StoreError::not_found("Trip", "T1").into();
        assert_eq!(err.to_string(), "Store error: Trip record not found: T1");
    }
}
