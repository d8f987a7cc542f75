//! Planned changes for a resource instance

use crate::schema::Schema;
use serde::{Deserialize, Serialize};

/// Type of action the host will take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource in place
    Update,
    /// Destroy and recreate
    Replace,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// A single attribute difference between prior state and plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub requires_replace: bool,
}

/// Plan for one resource instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub action_type: ActionType,
    pub changes: Vec<AttributeChange>,
}

impl Plan {
    /// Diff prior state against the planned state.
    ///
    /// Attributes are compared as JSON; only attributes named by the schema
    /// participate.
    pub fn diff(
        schema: &Schema,
        prior: Option<&serde_json::Value>,
        planned: &serde_json::Value,
    ) -> Self {
        let null = serde_json::Value::Null;
        let mut changes = Vec::new();

        for attribute in &schema.attributes {
            let before = prior
                .and_then(|p| p.get(&attribute.name))
                .unwrap_or(&null);
            let after = planned.get(&attribute.name).unwrap_or(&null);
            if prior.is_some() && before == after {
                continue;
            }
            if prior.is_none() && after.is_null() {
                continue;
            }
            changes.push(AttributeChange {
                name: attribute.name.clone(),
                before: before.clone(),
                after: after.clone(),
                requires_replace: prior.is_some() && attribute.replace_on_change,
            });
        }

        let action_type = match prior {
            None => ActionType::Create,
            Some(_) if changes.is_empty() => ActionType::NoOp,
            Some(_) if changes.iter().any(|c| c.requires_replace) => ActionType::Replace,
            Some(_) => ActionType::Update,
        };

        Self {
            action_type,
            changes,
        }
    }

    pub fn delete(prior: &serde_json::Value) -> Self {
        let changes = prior
            .as_object()
            .map(|obj| {
                obj.iter()
                    .map(|(name, before)| AttributeChange {
                        name: name.clone(),
                        before: before.clone(),
                        after: serde_json::Value::Null,
                        requires_replace: false,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            action_type: ActionType::Delete,
            changes,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.action_type != ActionType::NoOp
    }

    pub fn change(&self, name: &str) -> Option<&AttributeChange> {
        self.changes.iter().find(|c| c.name == name)
    }
}
