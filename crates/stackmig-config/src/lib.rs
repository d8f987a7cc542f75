//! Provider configuration for stackmig
//!
//! Resolves the platform host, API token, and default organization/project
//! the provider is configured with. The resolved values are captured once at
//! configure time and are read-only afterwards.

pub mod error;

pub use error::*;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The only platform host the provider talks to
pub const CANONICAL_HOST: &str = "app.terraform.io";

/// Overrides the configured organization when non-empty
pub const ORG_ENV: &str = "TF_CLOUD_ORGANIZATION";

/// Overrides the configured project when non-empty
pub const PROJECT_ENV: &str = "TF_CLOUD_PROJECT";

/// API token used when the provider configuration has none
pub const TOKEN_ENV: &str = "TFE_TOKEN";

const CREDENTIALS_SUBDIR: &str = ".terraform.d";
const CREDENTIALS_FILE: &str = "credentials.tfrc.json";

/// Provider block as supplied by the user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub ssl_skip_verify: bool,
}

/// Provider configuration after host pinning and token resolution
#[derive(Clone)]
pub struct ResolvedConfig {
    pub hostname: String,
    pub token: String,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub ssl_skip_verify: bool,
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("hostname", &self.hostname)
            .field("token", &"<redacted>")
            .field("organization", &self.organization)
            .field("project", &self.project)
            .field("ssl_skip_verify", &self.ssl_skip_verify)
            .finish()
    }
}

impl ProviderConfig {
    /// Pin the host and resolve the token.
    ///
    /// Token sources, first non-empty wins:
    /// 1. `token` in the provider configuration
    /// 2. `TFE_TOKEN`
    /// 3. `$HOME/.terraform.d/credentials.tfrc.json`
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let hostname = match self.hostname.as_deref().map(str::trim) {
            None | Some("") => CANONICAL_HOST.to_string(),
            Some(host) if host == CANONICAL_HOST => host.to_string(),
            Some(host) => return Err(ConfigError::HostNotAllowed(host.to_string())),
        };

        let token = match non_empty(self.token.clone()).or_else(|| env_override(TOKEN_ENV)) {
            Some(token) => token,
            None => {
                let path = credentials_path()?;
                read_token(&path, &hostname)?
            }
        };

        if token.is_empty() {
            return Err(ConfigError::MissingToken(hostname));
        }

        tracing::debug!(hostname = %hostname, "resolved provider configuration");
        Ok(ResolvedConfig {
            hostname,
            token,
            organization: non_empty(self.organization.clone()),
            project: non_empty(self.project.clone()),
            ssl_skip_verify: self.ssl_skip_verify,
        })
    }
}

/// Value of an environment variable if set and non-empty
pub fn env_override(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Location of the local credentials store
pub fn credentials_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
    Ok(home.join(CREDENTIALS_SUBDIR).join(CREDENTIALS_FILE))
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: std::collections::HashMap<String, HostCredentials>,
}

#[derive(Debug, Deserialize)]
struct HostCredentials {
    #[serde(default)]
    token: String,
}

/// Read `credentials.<hostname>.token` from a credentials file.
///
/// A missing file or missing key yields an empty token.
pub fn read_token(path: &Path, hostname: &str) -> Result<String> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "credentials file not found");
        return Ok(String::new());
    }

    let content = std::fs::read_to_string(path)?;
    let file: CredentialsFile =
        serde_json::from_str(&content).map_err(|source| ConfigError::CredentialsParse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(file
        .credentials
        .get(hostname)
        .map(|c| c.token.clone())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn write_credentials(home: &Path, body: &str) {
        let dir = home.join(CREDENTIALS_SUBDIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CREDENTIALS_FILE), body).unwrap();
    }

    #[test]
    fn test_read_token() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_credentials(
            temp_dir.path(),
            r#"{"credentials": {"app.terraform.io": {"token": "abc.atlasv1.xyz"}}}"#,
        );
        let path = temp_dir.path().join(CREDENTIALS_SUBDIR).join(CREDENTIALS_FILE);

        assert_eq!(read_token(&path, CANONICAL_HOST).unwrap(), "abc.atlasv1.xyz");
        assert_eq!(read_token(&path, "other.example.com").unwrap(), "");
    }

    #[test]
    fn test_read_token_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let token = read_token(&temp_dir.path().join("nope.json"), CANONICAL_HOST).unwrap();
        assert!(token.is_empty());
    }

    #[test]
    fn test_read_token_malformed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_token(&path, CANONICAL_HOST),
            Err(ConfigError::CredentialsParse { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_explicit_token() {
        temp_env::with_var_unset(TOKEN_ENV, || {
            let config = ProviderConfig {
                token: Some("explicit".to_string()),
                organization: Some("acme".to_string()),
                ..Default::default()
            };
            let resolved = config.resolve().unwrap();
            assert_eq!(resolved.hostname, CANONICAL_HOST);
            assert_eq!(resolved.token, "explicit");
            assert_eq!(resolved.organization.as_deref(), Some("acme"));
            assert!(resolved.project.is_none());
            assert!(!resolved.ssl_skip_verify);
        });
    }

    #[test]
    #[serial]
    fn test_resolve_rejects_other_host() {
        let config = ProviderConfig {
            hostname: Some("tfe.example.com".to_string()),
            token: Some("t".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::HostNotAllowed(host)) if host == "tfe.example.com"
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_from_credentials_file() {
        let home = tempfile::tempdir().unwrap();
        write_credentials(
            home.path(),
            r#"{"credentials": {"app.terraform.io": {"token": "from-file"}}}"#,
        );

        temp_env::with_vars(
            [
                ("HOME", Some(home.path().to_str().unwrap())),
                (TOKEN_ENV, None),
            ],
            || {
                let resolved = ProviderConfig::default().resolve().unwrap();
                assert_eq!(resolved.token, "from-file");
            },
        );
    }

    #[test]
    #[serial]
    fn test_resolve_env_token_wins_over_file() {
        let home = tempfile::tempdir().unwrap();
        write_credentials(
            home.path(),
            r#"{"credentials": {"app.terraform.io": {"token": "from-file"}}}"#,
        );

        temp_env::with_vars(
            [
                ("HOME", Some(home.path().to_str().unwrap())),
                (TOKEN_ENV, Some("from-env")),
            ],
            || {
                let resolved = ProviderConfig::default().resolve().unwrap();
                assert_eq!(resolved.token, "from-env");
            },
        );
    }

    #[test]
    #[serial]
    fn test_resolve_missing_token() {
        let home = tempfile::tempdir().unwrap();

        temp_env::with_vars(
            [
                ("HOME", Some(home.path().to_str().unwrap())),
                (TOKEN_ENV, None),
            ],
            || {
                let err = ProviderConfig::default().resolve().unwrap_err();
                assert!(matches!(err, ConfigError::MissingToken(ref h) if h == CANONICAL_HOST));
                assert!(err.user_message().contains("terraform login"));
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_override_ignores_empty() {
        temp_env::with_var(ORG_ENV, Some(""), || {
            assert!(env_override(ORG_ENV).is_none());
        });
        temp_env::with_var(ORG_ENV, Some("acme"), || {
            assert_eq!(env_override(ORG_ENV).as_deref(), Some("acme"));
        });
    }
}
