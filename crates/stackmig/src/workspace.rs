//! Harness workspace: the migrations file plus the local state store

use anyhow::Context;
use serde::Deserialize;
use stackmig_config::ProviderConfig;
use stackmig_framework::{GlobalState, ResourceState, StateManager};
use stackmig_provider::{StackMigrationModel, TYPE_NAME};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "stackmig.json";

/// Contents of `stackmig.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Stack migrations by local name
    #[serde(default)]
    pub migrations: BTreeMap<String, StackMigrationModel>,
}

pub struct Workspace {
    pub config: HarnessConfig,
    pub state: StateManager,
}

impl Workspace {
    pub fn load(root: &Path, config_file: &Path) -> anyhow::Result<Self> {
        let path = root.join(config_file);
        if !path.exists() {
            anyhow::bail!(
                "{} not found in {}",
                config_file.display(),
                root.display()
            );
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: HarnessConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            migrations = config.migrations.len(),
            "loaded migrations file"
        );

        Ok(Self {
            config,
            state: StateManager::new(root),
        })
    }
}

/// Stack migration models recorded in `state`, keyed like the config
pub fn recorded(state: &GlobalState) -> anyhow::Result<BTreeMap<String, StackMigrationModel>> {
    state
        .resources
        .iter()
        .filter(|(_, r)| r.resource_type == TYPE_NAME)
        .map(|(key, r)| {
            let model = r
                .decode::<StackMigrationModel>()
                .with_context(|| format!("state entry '{}' is corrupt", key))?;
            Ok((key.clone(), model))
        })
        .collect()
}

/// Write `model` into `state` under `key`, or drop the entry for `None`
pub fn record(
    state: &mut GlobalState,
    key: &str,
    model: Option<&StackMigrationModel>,
) -> anyhow::Result<()> {
    match model {
        Some(model) => {
            let attributes = serde_json::to_value(model)?;
            state.set_resource(key.to_string(), ResourceState::new(TYPE_NAME, attributes));
        }
        None => {
            state.remove_resource(key);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackmig_framework::Value;

    #[test]
    fn test_load_migrations_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"{
                "provider": { "token": "secret", "organization": "acme" },
                "migrations": {
                    "payments": {
                        "org": "acme",
                        "project": "infra",
                        "name": "payments",
                        "config_file_dir": "/srv/stacks/payments"
                    }
                }
            }"#,
        )
        .unwrap();

        let ws = Workspace::load(dir.path(), Path::new(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(ws.config.provider.token.as_deref(), Some("secret"));
        let payments = &ws.config.migrations["payments"];
        assert_eq!(payments.name, Value::known("payments"));
        assert!(payments.config_hash.is_null());
    }

    #[test]
    fn test_missing_file_names_it() {
        let dir = tempfile::tempdir().unwrap();
        let err = Workspace::load(dir.path(), Path::new(DEFAULT_CONFIG_FILE))
            .err()
            .unwrap();
        assert!(err.to_string().contains("stackmig.json not found"));
    }

    #[test]
    fn test_record_and_recover() {
        let mut state = GlobalState::new();
        let mut model = StackMigrationModel::new("acme", "infra", "payments", "/srv/cfg");
        model.config_hash = Value::known("abc");

        record(&mut state, "payments", Some(&model)).unwrap();
        assert_eq!(recorded(&state).unwrap()["payments"], model);

        record(&mut state, "payments", None).unwrap();
        assert!(recorded(&state).unwrap().is_empty());
    }
}
