//! Provider configuration
//!
//! `configure` runs once per process: it pins the host, resolves the token
//! and builds the shared platform client. Everything it captures is
//! read-only afterwards.

use crate::error::Result;
use crate::resource::StackMigrationResource;
use stackmig_config::{ProviderConfig, ResolvedConfig};
use stackmig_platform::{ClientConfig, HttpPlatform, StackPlatform};
use std::sync::Arc;
use std::time::Duration;

pub struct Provider {
    platform: Arc<dyn StackPlatform>,
    organization: Option<String>,
    project: Option<String>,
    await_timeout: Option<Duration>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Resolve `config` and connect to the platform
    pub fn configure(config: &ProviderConfig) -> Result<Self> {
        let resolved = config.resolve()?;
        let platform = Self::connect(&resolved)?;
        tracing::info!(
            host = %resolved.hostname,
            organization = ?resolved.organization,
            project = ?resolved.project,
            "provider configured"
        );
        Ok(Self::with_platform(Arc::new(platform), &resolved))
    }

    fn connect(resolved: &ResolvedConfig) -> Result<HttpPlatform> {
        let client = ClientConfig::for_host(&resolved.hostname, resolved.token.clone())
            .with_ssl_skip_verify(resolved.ssl_skip_verify);
        Ok(HttpPlatform::new(client)?)
    }

    /// Use an existing platform client
    pub fn with_platform(platform: Arc<dyn StackPlatform>, resolved: &ResolvedConfig) -> Self {
        Self {
            platform,
            organization: resolved.organization.clone(),
            project: resolved.project.clone(),
            await_timeout: None,
        }
    }

    /// Override the await budget for every resource this provider builds
    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = Some(timeout);
        self
    }

    pub fn stack_migration(&self) -> StackMigrationResource {
        let resource = StackMigrationResource::new(self.platform.clone())
            .with_defaults(self.organization.clone(), self.project.clone());
        match self.await_timeout {
            Some(timeout) => resource.with_await_timeout(timeout),
            None => resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use serial_test::serial;
    use stackmig_config::{ConfigError, TOKEN_ENV};

    #[test]
    #[serial]
    fn test_configure_with_explicit_token() {
        temp_env::with_var_unset(TOKEN_ENV, || {
            let config = ProviderConfig {
                token: Some("secret".into()),
                organization: Some("acme".into()),
                ..Default::default()
            };
            let provider = Provider::configure(&config).unwrap();
            assert_eq!(provider.organization.as_deref(), Some("acme"));
            assert_eq!(provider.project, None);
        });
    }

    #[test]
    #[serial]
    fn test_configure_without_token_fails() {
        let home = tempfile::tempdir().unwrap();
        temp_env::with_vars(
            [
                ("HOME", Some(home.path().to_str().unwrap())),
                (TOKEN_ENV, None),
            ],
            || {
                let err = Provider::configure(&ProviderConfig::default()).unwrap_err();
                assert!(matches!(
                    err,
                    ProviderError::Config(ConfigError::MissingToken(_))
                ));
            },
        );
    }

    #[test]
    #[serial]
    fn test_configure_rejects_other_hosts() {
        let config = ProviderConfig {
            hostname: Some("tfe.example.com".into()),
            token: Some("secret".into()),
            ..Default::default()
        };
        let err = Provider::configure(&config).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Config(ConfigError::HostNotAllowed(_))
        ));
    }
}
