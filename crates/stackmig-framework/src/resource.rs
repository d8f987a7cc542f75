//! Resource lifecycle trait definition

use crate::cancel::CancelToken;
use crate::diagnostic::Diagnostics;
use crate::schema::Schema;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Outcome of a state-producing lifecycle callback.
///
/// `state` may be set even when `diagnostics` carries errors; the host
/// persists it so the next plan observes what happened remotely.
#[derive(Debug, Clone)]
pub struct ResourceResponse<M> {
    pub state: Option<M>,
    pub diagnostics: Diagnostics,
}

impl<M> ResourceResponse<M> {
    pub fn ok(state: M) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    pub fn with_diagnostics(state: Option<M>, diagnostics: Diagnostics) -> Self {
        Self { state, diagnostics }
    }
}

/// Declarative resource abstraction
///
/// The host invokes callbacks serially per instance in the order
/// validate → modify_plan → (create xor update) → read. Callbacks report
/// failures as diagnostics rather than `Err`.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Typed attribute model persisted in state
    type Model: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync;

    /// Resource type name (e.g., "tfmigrate_stack_migration")
    fn type_name(&self) -> &str;

    fn schema(&self) -> Schema;

    /// Check the user configuration before any network call. May normalize
    /// the configuration in place (env-variable overrides).
    async fn validate_config(&self, config: &mut Self::Model) -> Diagnostics;

    /// Fill computed attributes so the host can diff plan against state.
    async fn modify_plan(
        &self,
        cancel: &CancelToken,
        prior: Option<&Self::Model>,
        plan: &mut Self::Model,
    ) -> Diagnostics;

    async fn create(&self, cancel: &CancelToken, plan: Self::Model)
    -> ResourceResponse<Self::Model>;

    async fn read(&self, cancel: &CancelToken, state: Self::Model)
    -> ResourceResponse<Self::Model>;

    async fn update(
        &self,
        cancel: &CancelToken,
        prior: Self::Model,
        plan: Self::Model,
    ) -> ResourceResponse<Self::Model>;

    async fn delete(&self, cancel: &CancelToken, state: Self::Model) -> Diagnostics;
}
