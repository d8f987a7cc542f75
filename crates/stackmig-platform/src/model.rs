//! Platform resource models

use crate::error::PlatformError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub id: String,
    pub name: String,
    pub project_id: String,
    /// Stack is connected to a VCS repository
    pub vcs_driven: bool,
    pub deployment_names: Vec<String>,
    pub latest_configuration: Option<StackConfiguration>,
    pub diagnostics: Vec<RemoteDiagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackConfiguration {
    pub id: String,
    pub status: ConfigurationStatus,
    pub sequence_number: Option<u64>,
    pub deployment_names: Vec<String>,
}

/// Diagnostic reported by the platform for a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDiagnostic {
    pub severity: String,
    pub summary: String,
    #[serde(default)]
    pub detail: String,
}

/// Lifecycle status of a stack configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationStatus {
    Pending,
    Queued,
    Preparing,
    Enqueueing,
    Converging,
    Converged,
    Errored,
    Canceled,
}

impl ConfigurationStatus {
    pub const ALL: [ConfigurationStatus; 8] = [
        ConfigurationStatus::Pending,
        ConfigurationStatus::Queued,
        ConfigurationStatus::Preparing,
        ConfigurationStatus::Enqueueing,
        ConfigurationStatus::Converging,
        ConfigurationStatus::Converged,
        ConfigurationStatus::Errored,
        ConfigurationStatus::Canceled,
    ];

    /// No further transitions will happen
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConfigurationStatus::Converged
                | ConfigurationStatus::Errored
                | ConfigurationStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigurationStatus::Pending => "pending",
            ConfigurationStatus::Queued => "queued",
            ConfigurationStatus::Preparing => "preparing",
            ConfigurationStatus::Enqueueing => "enqueueing",
            ConfigurationStatus::Converging => "converging",
            ConfigurationStatus::Converged => "converged",
            ConfigurationStatus::Errored => "errored",
            ConfigurationStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for ConfigurationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfigurationStatus {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PlatformError::Decode(format!("unknown configuration status '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classes() {
        let terminal: Vec<_> = ConfigurationStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.as_str())
            .collect();
        assert_eq!(terminal, ["converged", "errored", "canceled"]);
    }

    #[test]
    fn test_parse_round_trip() {
        for status in ConfigurationStatus::ALL {
            assert_eq!(status.as_str().parse::<ConfigurationStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
        assert!("completed".parse::<ConfigurationStatus>().is_err());
    }
}
