use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported hostname '{0}': only {host} is supported", host = crate::CANONICAL_HOST)]
    HostNotAllowed(String),

    #[error("No API token found for {0}")]
    MissingToken(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to parse credentials file {path}: {source}")]
    CredentialsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// User-facing message with remediation hints
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::MissingToken(host) => format!(
                "No API token found for {host}.\n\
                 \n\
                 Either:\n\
                 1. set `token` in the provider configuration\n\
                 2. export {env}\n\
                 3. run `terraform login {host}` to populate the credentials file",
                env = crate::TOKEN_ENV,
            ),
            ConfigError::HostNotAllowed(host) => format!(
                "Hostname '{host}' is not supported.\n\
                 \n\
                 Remove `hostname` from the provider configuration or set it to {}.",
                crate::CANONICAL_HOST
            ),
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
