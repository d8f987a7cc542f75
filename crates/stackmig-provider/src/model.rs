//! Stack migration resource model and schema

use serde::{Deserialize, Serialize};
use stackmig_framework::{AttributeSchema, Schema, Value};

/// Attribute names
pub mod attr {
    pub const ORG: &str = "org";
    pub const PROJECT: &str = "project";
    pub const NAME: &str = "name";
    pub const CONFIG_FILE_DIR: &str = "config_file_dir";
    pub const CONFIG_HASH: &str = "config_hash";
    pub const CURRENT_CONFIGURATION_ID: &str = "current_configuration_id";
    pub const CONFIG_STATUS: &str = "config_status";
}

/// State of one stack migration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMigrationModel {
    #[serde(default)]
    pub org: Value<String>,
    #[serde(default)]
    pub project: Value<String>,
    #[serde(default)]
    pub name: Value<String>,
    #[serde(default)]
    pub config_file_dir: Value<String>,
    #[serde(default)]
    pub config_hash: Value<String>,
    #[serde(default)]
    pub current_configuration_id: Value<String>,
    #[serde(default)]
    pub config_status: Value<String>,
}

impl StackMigrationModel {
    /// User-facing attributes only; computed ones are null
    pub fn new(org: &str, project: &str, name: &str, config_file_dir: &str) -> Self {
        Self {
            org: Value::known(org),
            project: Value::known(project),
            name: Value::known(name),
            config_file_dir: Value::known(config_file_dir),
            ..Default::default()
        }
    }

    /// `org`, `project` or `name` differ
    pub fn identity_differs(&self, other: &Self) -> bool {
        self.org != other.org || self.project != other.project || self.name != other.name
    }

    pub(crate) fn set_configuration(&mut self, id: Option<String>, status: Option<String>) {
        self.current_configuration_id = Value::from(id);
        self.config_status = Value::from(status);
    }
}

pub fn schema() -> Schema {
    Schema::v0("Uploads a configuration directory to an existing stack and tracks its convergence.")
        .with_attribute(
            AttributeSchema::required(attr::ORG, "Organization name").requires_replace(),
        )
        .with_attribute(
            AttributeSchema::required(attr::PROJECT, "Project name").requires_replace(),
        )
        .with_attribute(AttributeSchema::required(attr::NAME, "Stack name").requires_replace())
        .with_attribute(AttributeSchema::required(
            attr::CONFIG_FILE_DIR,
            "Absolute path to the stack configuration directory",
        ))
        .with_attribute(AttributeSchema::computed(
            attr::CONFIG_HASH,
            "SHA-256 of the packed configuration directory",
        ))
        .with_attribute(AttributeSchema::computed(
            attr::CURRENT_CONFIGURATION_ID,
            "Id of the stack configuration currently tracked",
        ))
        .with_attribute(AttributeSchema::computed(
            attr::CONFIG_STATUS,
            "Status of the tracked stack configuration",
        ))
}
