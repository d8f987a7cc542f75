//! Stack migration error types

use stackmig_archive::ArchiveError;
use stackmig_config::ConfigError;
use stackmig_framework::{AttributePath, Diagnostics};
use stackmig_platform::PlatformError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Invalid {attribute}: {message}")]
    InvalidConfig { attribute: String, message: String },

    #[error("Stack '{0}' is VCS-driven")]
    UnsupportedStack(String),

    #[error("Configuration {configuration_id} has deployments: {}", deployments.join(", "))]
    UploadForbidden {
        configuration_id: String,
        deployments: Vec<String>,
    },

    #[error("Configuration directory: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Provider configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Platform(#[from] PlatformError),
}

impl ProviderError {
    /// Record this error in `diagnostics`, scoped to an attribute where the
    /// error belongs to one.
    pub fn report(&self, diagnostics: &mut Diagnostics, context: &str) {
        match self {
            ProviderError::InvalidConfig { attribute, message } => diagnostics
                .add_attribute_error(
                    AttributePath::root(attribute.as_str()),
                    format!("Invalid {}", attribute),
                    message.clone(),
                ),
            ProviderError::Archive(e) => {
                let summary = if e.is_invalid_path() {
                    "Invalid configuration directory"
                } else if e.is_invalid_config() {
                    "Configuration directory must be an absolute path"
                } else {
                    "Failed to hash configuration directory"
                };
                diagnostics.add_attribute_error(
                    AttributePath::root(crate::model::attr::CONFIG_FILE_DIR),
                    summary,
                    e.to_string(),
                );
            }
            ProviderError::UnsupportedStack(name) => diagnostics.add_error(
                "Unsupported stack",
                format!(
                    "Stack '{}' is connected to a VCS repository. Only CLI-driven stacks \
                     can receive configuration uploads.",
                    name
                ),
            ),
            ProviderError::UploadForbidden {
                configuration_id,
                deployments,
            } => diagnostics.add_error(
                "Configuration upload not permitted",
                format!(
                    "The current configuration {} already has deployments ({}). \
                     Remove the deployments before uploading a new configuration.",
                    configuration_id,
                    deployments.join(", ")
                ),
            ),
            ProviderError::Config(e) => {
                diagnostics.add_error("Provider configuration error", e.user_message())
            }
            ProviderError::Platform(PlatformError::Unauthorized(detail)) => {
                diagnostics.add_error("Authentication failed", detail.clone())
            }
            ProviderError::Platform(PlatformError::NotFound(what)) => {
                diagnostics.add_error(format!("Error {}", context), format!("{} not found", what))
            }
            ProviderError::Platform(e) => {
                diagnostics.add_error(format!("Error {}", context), e.to_string())
            }
        }
    }

    pub fn to_diagnostics(&self, context: &str) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        self.report(&mut diagnostics, context);
        diagnostics
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
