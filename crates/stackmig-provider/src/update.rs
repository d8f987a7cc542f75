//! Update classification
//!
//! An update applies at most one action, chosen by the first matching
//! difference between prior state and plan.

use crate::model::StackMigrationModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    /// `config_hash`, `org`, `project` or `name` changed: upload
    SourceDrift,
    /// The platform reports a different latest configuration: await it
    ConfigurationChanged,
    /// Only the tracked configuration's status moved
    StatusChanged,
    /// Nothing the platform cares about (e.g. a moved directory with
    /// identical contents)
    None,
}

impl UpdateAction {
    pub fn classify(prior: &StackMigrationModel, plan: &StackMigrationModel) -> Self {
        if prior.config_hash != plan.config_hash || prior.identity_differs(plan) {
            UpdateAction::SourceDrift
        } else if prior.current_configuration_id != plan.current_configuration_id {
            UpdateAction::ConfigurationChanged
        } else if prior.config_status != plan.config_status {
            UpdateAction::StatusChanged
        } else {
            UpdateAction::None
        }
    }
}
