//! Stack migration resource
//!
//! Uploads a configuration directory to an existing CLI-driven stack and
//! follows the resulting configuration until it settles. Change detection is
//! content-addressed: the plan carries the digest of the packed directory,
//! so any byte change under `config_file_dir` surfaces as a diff.

use crate::admission::{self, Admission};
use crate::error::{ProviderError, Result};
use crate::model::{self, StackMigrationModel, attr};
use crate::update::UpdateAction;
use crate::validators::{self, NAME_RULE, ORG_RULE, PROJECT_RULE};
use async_trait::async_trait;
use stackmig_archive::{ArchiveError, Slug};
use stackmig_config::{ORG_ENV, PROJECT_ENV, env_override};
use stackmig_framework::{
    CancelToken, Diagnostics, Resource, ResourceResponse, Schema, Value,
};
use stackmig_platform::{
    AWAIT_TIMEOUT, Completion, ConfigurationStatus, PlatformError, Stack, StackConfiguration,
    StackPlatform, await_completion,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const TYPE_NAME: &str = "tfmigrate_stack_migration";

pub struct StackMigrationResource {
    platform: Arc<dyn StackPlatform>,
    organization: Option<String>,
    project: Option<String>,
    await_timeout: Duration,
}

/// Where an admission check left us
enum Admitted {
    Uploaded(String),
    Deferred(StackConfiguration),
}

/// Final status of an await plus what to tell the user about it
struct Settled {
    status: ConfigurationStatus,
    diagnostics: Diagnostics,
}

impl Settled {
    fn record(self, model: &mut StackMigrationModel, configuration_id: &str) -> Diagnostics {
        model.set_configuration(
            Some(configuration_id.to_string()),
            Some(self.status.as_str().to_string()),
        );
        self.diagnostics
    }
}

fn required<'a>(value: &'a Value<String>, attribute: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| ProviderError::InvalidConfig {
        attribute: attribute.to_string(),
        message: "value must be known".to_string(),
    })
}

fn planned_status(model: &StackMigrationModel) -> Option<ConfigurationStatus> {
    model.config_status.as_str().and_then(|s| s.parse().ok())
}

/// Env variable wins; otherwise a null attribute takes the provider default
fn apply_override(value: &mut Value<String>, var: &str, default: Option<&str>) {
    if let Some(overridden) = env_override(var) {
        debug!(var, value = %overridden, "attribute overridden from environment");
        *value = Value::Known(overridden);
    } else if value.is_null() {
        if let Some(default) = default {
            *value = Value::known(default);
        }
    }
}

/// Run an archive operation on `config_file_dir` off the async workers
async fn on_config_dir<T, F>(dir: &Value<String>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> stackmig_archive::Result<T> + Send + 'static,
{
    let dir = validators::check_config_dir(dir)?;
    let path = dir.clone();
    let out = tokio::task::spawn_blocking(move || op(&dir))
        .await
        .map_err(|e| ArchiveError::Pack {
            path,
            source: std::io::Error::other(e),
        })??;
    Ok(out)
}

/// SHA-256 of the packed `config_file_dir`
async fn compute_hash(dir: &Value<String>) -> Result<String> {
    on_config_dir(dir, |d| stackmig_archive::hash_directory(d)).await
}

/// Pack `config_file_dir` for upload; the slug's digest is the hash to record
async fn pack(dir: &Value<String>) -> Result<Slug> {
    on_config_dir(dir, Slug::pack).await
}

impl StackMigrationResource {
    pub fn new(platform: Arc<dyn StackPlatform>) -> Self {
        Self {
            platform,
            organization: None,
            project: None,
            await_timeout: AWAIT_TIMEOUT,
        }
    }

    /// Organization and project used when the resource leaves them null
    pub fn with_defaults(mut self, organization: Option<String>, project: Option<String>) -> Self {
        self.organization = organization;
        self.project = project;
        self
    }

    pub fn with_await_timeout(mut self, timeout: Duration) -> Self {
        self.await_timeout = timeout;
        self
    }

    /// Project and stack lookup; refuses VCS-driven stacks
    async fn locate_stack(&self, model: &StackMigrationModel) -> Result<Stack> {
        let org = required(&model.org, attr::ORG)?;
        let project_name = required(&model.project, attr::PROJECT)?;
        let name = required(&model.name, attr::NAME)?;

        let project = self.platform.read_project(org, project_name).await?;
        let stack = self.platform.read_stack(org, &project.id, name).await?;
        if stack.vcs_driven {
            return Err(ProviderError::UnsupportedStack(stack.name));
        }

        debug!(
            stack_id = %stack.id,
            latest = ?stack.latest_configuration.as_ref().map(|c| &c.id),
            "stack located"
        );
        Ok(stack)
    }

    /// Upload if the stack admits one, hand back the outstanding
    /// configuration if it must settle first.
    async fn admit_and_upload(&self, stack: &Stack, slug: &Slug) -> Result<Admitted> {
        let latest = stack.latest_configuration.as_ref();
        match (admission::admit(stack), latest) {
            (Admission::Upload, _) => {
                let configuration_id = self.platform.upload_configuration(&stack.id, slug).await?;
                info!(stack_id = %stack.id, configuration_id, "uploaded configuration");
                Ok(Admitted::Uploaded(configuration_id))
            }
            (Admission::Defer, Some(latest)) => {
                info!(
                    stack_id = %stack.id,
                    configuration_id = %latest.id,
                    status = %latest.status,
                    "configuration in progress, not uploading"
                );
                Ok(Admitted::Deferred(latest.clone()))
            }
            (Admission::Forbid, _) | (Admission::Defer, None) => {
                Err(ProviderError::UploadForbidden {
                    configuration_id: latest.map(|c| c.id.clone()).unwrap_or_default(),
                    deployments: admission::deployments(stack).to_vec(),
                })
            }
        }
    }

    /// Await `configuration_id` and translate the outcome into diagnostics.
    ///
    /// `known` is the status to record when the configuration could not be
    /// read at all.
    async fn settle(
        &self,
        cancel: &CancelToken,
        model: &StackMigrationModel,
        configuration_id: &str,
        known: ConfigurationStatus,
    ) -> Settled {
        let mut diagnostics = Diagnostics::new();
        let completion = await_completion(
            self.platform.as_ref(),
            configuration_id,
            cancel,
            self.await_timeout,
        )
        .await;

        let status = match completion {
            Ok(Completion::Converged) => {
                info!(configuration_id, "configuration converged");
                ConfigurationStatus::Converged
            }
            Ok(Completion::Errored) => {
                let detail = self.errored_detail(model, configuration_id).await;
                diagnostics.add_error("Stack configuration errored", detail);
                ConfigurationStatus::Errored
            }
            Ok(Completion::Canceled) => {
                diagnostics.add_error(
                    "Stack configuration canceled",
                    format!("Configuration {} was canceled on the platform.", configuration_id),
                );
                ConfigurationStatus::Canceled
            }
            Ok(Completion::StreamClosed(status)) => {
                diagnostics.add_warning(
                    "Stack configuration still in progress",
                    format!(
                        "Status updates for configuration {} stopped while it was {}. \
                         Apply again to keep waiting.",
                        configuration_id, status
                    ),
                );
                status
            }
            Ok(Completion::TimedOut(status)) => {
                diagnostics.add_warning(
                    "Timed out waiting for stack configuration",
                    format!(
                        "Configuration {} is still {} after {}s. Apply again to keep waiting.",
                        configuration_id,
                        status,
                        self.await_timeout.as_secs()
                    ),
                );
                status
            }
            Err(PlatformError::Timeout(what)) => {
                diagnostics.add_warning(
                    "Timed out waiting for stack configuration",
                    format!("Gave up {} before its status could be read.", what),
                );
                known
            }
            Err(e) => {
                ProviderError::from(e).report(&mut diagnostics, "waiting for stack configuration");
                known
            }
        };

        Settled {
            status,
            diagnostics,
        }
    }

    /// Error detail for an errored configuration, with the stack's remote
    /// diagnostics appended when they can be fetched.
    async fn errored_detail(&self, model: &StackMigrationModel, configuration_id: &str) -> String {
        let mut detail = format!("Configuration {} finished with status errored.", configuration_id);
        match self.locate_stack(model).await {
            Ok(stack) => {
                for d in &stack.diagnostics {
                    detail.push_str(&format!("\n  - {}", d.summary));
                    if !d.detail.is_empty() {
                        detail.push_str(&format!(": {}", d.detail));
                    }
                }
            }
            Err(e) => debug!(error = %e, "stack diagnostics unavailable"),
        }
        detail
    }

    async fn try_modify_plan(&self, plan: &mut StackMigrationModel) -> Result<()> {
        let hash = compute_hash(&plan.config_file_dir).await?;
        let stack = self.locate_stack(plan).await?;

        plan.config_hash = Value::Known(hash);
        match stack.latest_configuration {
            Some(latest) => {
                plan.set_configuration(Some(latest.id), Some(latest.status.as_str().to_string()))
            }
            None => plan.set_configuration(None, None),
        }
        Ok(())
    }

    async fn try_create(
        &self,
        cancel: &CancelToken,
        plan: StackMigrationModel,
    ) -> Result<ResourceResponse<StackMigrationModel>> {
        let org = required(&plan.org, attr::ORG)?;
        self.platform.read_organization(org).await?;
        let stack = self.locate_stack(&plan).await?;
        let slug = pack(&plan.config_file_dir).await?;
        self.upload(cancel, &stack, plan, slug, Value::Null).await
    }

    async fn try_read(
        &self,
        mut state: StackMigrationModel,
    ) -> Result<ResourceResponse<StackMigrationModel>> {
        let hash = compute_hash(&state.config_file_dir).await?;
        let stack = match self.locate_stack(&state).await {
            Err(ProviderError::Platform(e)) if e.is_not_found() => {
                warn!(error = %e, "stack gone, dropping from state");
                let mut diagnostics = Diagnostics::new();
                diagnostics.add_warning(
                    "Stack no longer exists",
                    format!("{}. The stack migration was removed from state.", e),
                );
                return Ok(ResourceResponse::with_diagnostics(None, diagnostics));
            }
            other => other?,
        };

        state.config_hash = Value::Known(hash);
        match stack.latest_configuration {
            Some(latest) => {
                state.set_configuration(Some(latest.id), Some(latest.status.as_str().to_string()))
            }
            None => state.set_configuration(None, None),
        }
        Ok(ResourceResponse::ok(state))
    }

    async fn try_update(
        &self,
        cancel: &CancelToken,
        prior: StackMigrationModel,
        plan: StackMigrationModel,
    ) -> Result<ResourceResponse<StackMigrationModel>> {
        let action = UpdateAction::classify(&prior, &plan);
        debug!(?action, "update classified");

        match action {
            UpdateAction::SourceDrift => self.apply_source_drift(cancel, prior, plan).await,
            UpdateAction::ConfigurationChanged => self.follow_planned(cancel, plan).await,
            UpdateAction::StatusChanged => match planned_status(&plan) {
                Some(status) if status.is_terminal() => Ok(ResourceResponse::ok(plan)),
                _ => self.follow_planned(cancel, plan).await,
            },
            UpdateAction::None => Ok(ResourceResponse::ok(plan)),
        }
    }

    /// Await the configuration the plan tracks
    async fn follow_planned(
        &self,
        cancel: &CancelToken,
        mut plan: StackMigrationModel,
    ) -> Result<ResourceResponse<StackMigrationModel>> {
        let configuration_id =
            required(&plan.current_configuration_id, attr::CURRENT_CONFIGURATION_ID)?.to_string();
        let known = planned_status(&plan).unwrap_or(ConfigurationStatus::Pending);

        let settled = self.settle(cancel, &plan, &configuration_id, known).await;
        let diagnostics = settled.record(&mut plan, &configuration_id);
        Ok(ResourceResponse::with_diagnostics(Some(plan), diagnostics))
    }

    async fn apply_source_drift(
        &self,
        cancel: &CancelToken,
        prior: StackMigrationModel,
        plan: StackMigrationModel,
    ) -> Result<ResourceResponse<StackMigrationModel>> {
        let stack = self.locate_stack(&plan).await?;
        let slug = pack(&plan.config_file_dir).await?;
        self.upload(cancel, &stack, plan, slug, prior.config_hash).await
    }

    /// Upload `slug` and await the new configuration.
    ///
    /// A transitional latest configuration is awaited first and admission
    /// checked once more. If it does not settle, the upload is postponed and
    /// `unclaimed` is recorded as the hash, so the next plan still differs.
    async fn upload(
        &self,
        cancel: &CancelToken,
        stack: &Stack,
        plan: StackMigrationModel,
        slug: Slug,
        unclaimed: Value<String>,
    ) -> Result<ResourceResponse<StackMigrationModel>> {
        let outstanding = match self.admit_and_upload(stack, &slug).await? {
            Admitted::Uploaded(configuration_id) => {
                return Ok(self.follow_upload(cancel, plan, &slug, &configuration_id).await);
            }
            Admitted::Deferred(latest) => latest,
        };

        let settled = self
            .settle(cancel, &plan, &outstanding.id, outstanding.status)
            .await;
        if !settled.status.is_terminal() {
            return Ok(Self::postponed(unclaimed, plan, &outstanding.id, settled));
        }
        debug!(
            configuration_id = %outstanding.id,
            status = %settled.status,
            "outstanding configuration settled, re-checking admission"
        );

        let stack = self.locate_stack(&plan).await?;
        match self.admit_and_upload(&stack, &slug).await? {
            Admitted::Uploaded(configuration_id) => {
                Ok(self.follow_upload(cancel, plan, &slug, &configuration_id).await)
            }
            Admitted::Deferred(latest) => {
                let settled = Settled {
                    status: latest.status,
                    diagnostics: Diagnostics::new(),
                };
                Ok(Self::postponed(unclaimed, plan, &latest.id, settled))
            }
        }
    }

    /// Await a configuration this run uploaded and claim its digest
    async fn follow_upload(
        &self,
        cancel: &CancelToken,
        mut plan: StackMigrationModel,
        slug: &Slug,
        configuration_id: &str,
    ) -> ResourceResponse<StackMigrationModel> {
        let settled = self
            .settle(cancel, &plan, configuration_id, ConfigurationStatus::Pending)
            .await;
        plan.config_hash = Value::Known(slug.digest());
        let diagnostics = settled.record(&mut plan, configuration_id);
        ResourceResponse::with_diagnostics(Some(plan), diagnostics)
    }

    /// Track `configuration_id` without claiming the directory's hash
    fn postponed(
        unclaimed: Value<String>,
        mut plan: StackMigrationModel,
        configuration_id: &str,
        settled: Settled,
    ) -> ResourceResponse<StackMigrationModel> {
        plan.config_hash = unclaimed;
        let mut diagnostics = settled.record(&mut plan, configuration_id);
        diagnostics.add_warning(
            "Configuration upload postponed",
            format!(
                "Configuration {} is still in progress, so the configuration directory was \
                 not uploaded. Apply again once it settles.",
                configuration_id
            ),
        );
        ResourceResponse::with_diagnostics(Some(plan), diagnostics)
    }
}

#[async_trait]
impl Resource for StackMigrationResource {
    type Model = StackMigrationModel;

    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        model::schema()
    }

    async fn validate_config(&self, config: &mut StackMigrationModel) -> Diagnostics {
        apply_override(&mut config.org, ORG_ENV, self.organization.as_deref());
        apply_override(&mut config.project, PROJECT_ENV, self.project.as_deref());

        let mut diagnostics = Diagnostics::new();
        let checks = [
            ORG_RULE.check(&config.org),
            PROJECT_RULE.check(&config.project),
            NAME_RULE.check(&config.name),
            validators::check_config_dir(&config.config_file_dir).map(|_| ()),
        ];
        for err in checks.into_iter().filter_map(|r| r.err()) {
            err.report(&mut diagnostics, "validating configuration");
        }
        diagnostics
    }

    async fn modify_plan(
        &self,
        _cancel: &CancelToken,
        _prior: Option<&StackMigrationModel>,
        plan: &mut StackMigrationModel,
    ) -> Diagnostics {
        match self.try_modify_plan(plan).await {
            Ok(()) => Diagnostics::new(),
            Err(e) => e.to_diagnostics("planning stack migration"),
        }
    }

    async fn create(
        &self,
        cancel: &CancelToken,
        plan: StackMigrationModel,
    ) -> ResourceResponse<StackMigrationModel> {
        self.try_create(cancel, plan)
            .await
            .unwrap_or_else(|e| ResourceResponse::failed(e.to_diagnostics("creating stack migration")))
    }

    async fn read(
        &self,
        _cancel: &CancelToken,
        state: StackMigrationModel,
    ) -> ResourceResponse<StackMigrationModel> {
        self.try_read(state)
            .await
            .unwrap_or_else(|e| ResourceResponse::failed(e.to_diagnostics("reading stack migration")))
    }

    async fn update(
        &self,
        cancel: &CancelToken,
        prior: StackMigrationModel,
        plan: StackMigrationModel,
    ) -> ResourceResponse<StackMigrationModel> {
        self.try_update(cancel, prior, plan)
            .await
            .unwrap_or_else(|e| ResourceResponse::failed(e.to_diagnostics("updating stack migration")))
    }

    async fn delete(&self, _cancel: &CancelToken, state: StackMigrationModel) -> Diagnostics {
        info!(stack = %state.name, "destroy requested; leaving remote stack untouched");
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_warning(
            "Destroy is not supported",
            "The stack, its configurations and its deployments are left unchanged on the \
             platform. The stack migration was only removed from state.",
        );
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use stackmig_platform::fake::FakePlatform;
    use tempfile::TempDir;
    use ConfigurationStatus::*;

    const STACK_ID: &str = "st-payments";

    struct Fixture {
        platform: Arc<FakePlatform>,
        resource: StackMigrationResource,
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let platform = Arc::new(FakePlatform::with_stack("acme", "infra", "payments"));
            let resource = StackMigrationResource::new(platform.clone());
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("main.tf"), "component \"db\" {}\n").unwrap();
            Self {
                platform,
                resource,
                dir,
            }
        }

        fn config(&self) -> StackMigrationModel {
            StackMigrationModel::new("acme", "infra", "payments", self.dir_str())
        }

        fn dir_str(&self) -> &str {
            self.dir.path().to_str().unwrap()
        }

        fn hash(&self) -> String {
            stackmig_archive::hash_directory(self.dir.path()).unwrap()
        }

        fn rewrite(&self, body: &str) {
            std::fs::write(self.dir.path().join("main.tf"), body).unwrap();
        }

        async fn plan(&self) -> (StackMigrationModel, Diagnostics) {
            let mut plan = self.config();
            let diags = self
                .resource
                .modify_plan(&CancelToken::new(), None, &mut plan)
                .await;
            (plan, diags)
        }

        /// Plan and create, returning the refreshed state
        async fn apply_fresh(&self) -> StackMigrationModel {
            let (plan, diags) = self.plan().await;
            assert!(diags.is_empty(), "{diags:?}");
            let created = self.resource.create(&CancelToken::new(), plan).await;
            assert!(!created.diagnostics.has_error(), "{:?}", created.diagnostics);
            let read = self
                .resource
                .read(&CancelToken::new(), created.state.unwrap())
                .await;
            read.state.unwrap()
        }
    }

    fn known(s: &str) -> Value<String> {
        Value::known(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_create_uploads_and_converges() {
        let fx = Fixture::new();
        let (plan, diags) = fx.plan().await;
        assert!(diags.is_empty());
        assert_eq!(plan.config_hash, Value::Known(fx.hash()));
        assert!(plan.current_configuration_id.is_null());
        assert!(plan.config_status.is_null());

        let response = fx.resource.create(&CancelToken::new(), plan).await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);

        let state = response.state.unwrap();
        assert_eq!(state.config_status, known("converged"));
        assert_eq!(state.current_configuration_id, known("stc-upload-1"));
        assert_eq!(state.config_hash, Value::Known(fx.hash()));

        let uploads = fx.platform.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].stack_id, STACK_ID);
        assert_eq!(uploads[0].digest, fx.hash());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_with_unchanged_directory_plans_nothing() {
        let fx = Fixture::new();
        let state = fx.apply_fresh().await;
        let reads_before = fx.platform.configuration_reads();

        let (plan, diags) = fx.plan().await;
        assert!(diags.is_empty());
        assert_eq!(plan, state);

        let diff = stackmig_framework::Plan::diff(
            &fx.resource.schema(),
            Some(&serde_json::to_value(&state).unwrap()),
            &serde_json::to_value(&plan).unwrap(),
        );
        assert!(!diff.has_changes());
        assert_eq!(fx.platform.uploads().len(), 1);
        assert_eq!(fx.platform.configuration_reads(), reads_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_directory_uploads_again() {
        let fx = Fixture::new();
        let prior = fx.apply_fresh().await;

        fx.rewrite("component \"db\" { size = 2 }\n");
        let (plan, diags) = fx.plan().await;
        assert!(diags.is_empty());
        assert_ne!(plan.config_hash, prior.config_hash);

        let response = fx.resource.update(&CancelToken::new(), prior, plan).await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state.unwrap();
        assert_eq!(state.current_configuration_id, known("stc-upload-2"));
        assert_eq!(state.config_status, known("converged"));
        assert_eq!(state.config_hash, Value::Known(fx.hash()));
        assert_eq!(fx.platform.uploads().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deployments_forbid_upload() {
        let fx = Fixture::new();
        let prior = fx.apply_fresh().await;
        fx.platform.set_deployments("stc-upload-1", &["prod"]);

        fx.rewrite("component \"db\" { size = 3 }\n");
        let (plan, _) = fx.plan().await;
        let response = fx.resource.update(&CancelToken::new(), prior, plan).await;

        assert!(response.state.is_none());
        let error = response.diagnostics.errors().next().unwrap();
        assert_eq!(error.summary, "Configuration upload not permitted");
        assert!(error.detail.contains("prod"));
        assert_eq!(fx.platform.uploads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_forbidden_with_deployments() {
        let fx = Fixture::new();
        fx.platform.add_configuration("stc-7", Converged, &[]);
        fx.platform.set_latest(STACK_ID, "stc-7");
        fx.platform.set_deployments("stc-7", &["prod"]);

        let (plan, _) = fx.plan().await;
        let response = fx.resource.create(&CancelToken::new(), plan).await;
        assert!(response.state.is_none());
        assert!(response.diagnostics.has_error());
        assert!(fx.platform.uploads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitional_latest_settles_before_upload() {
        let fx = Fixture::new();
        fx.platform
            .add_configuration("stc-7", Preparing, &[Converging, Converged]);
        fx.platform.set_latest(STACK_ID, "stc-7");

        let (plan, _) = fx.plan().await;
        assert_eq!(plan.config_status, known("preparing"));

        let response = fx.resource.create(&CancelToken::new(), plan).await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(fx.platform.configuration_status("stc-7"), Some(Converged));

        let state = response.state.unwrap();
        assert_eq!(state.current_configuration_id, known("stc-upload-1"));
        assert_eq!(state.config_status, known("converged"));
        assert_eq!(state.config_hash, Value::Known(fx.hash()));
        let uploads = fx.platform.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].digest, fx.hash());

        let (replan, _) = fx.plan().await;
        assert_eq!(replan, state);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout_leaves_directory_unclaimed() {
        let fx = Fixture::new();
        fx.platform.add_configuration("stc-7", Preparing, &[Converging]);
        fx.platform.stall_after_script("stc-7");
        fx.platform.set_latest(STACK_ID, "stc-7");

        let (plan, _) = fx.plan().await;
        let response = fx.resource.create(&CancelToken::new(), plan).await;

        assert!(!response.diagnostics.has_error());
        let summaries: Vec<_> = response
            .diagnostics
            .warnings()
            .map(|w| w.summary.as_str())
            .collect();
        assert_eq!(
            summaries,
            [
                "Timed out waiting for stack configuration",
                "Configuration upload postponed"
            ]
        );
        let state = response.state.unwrap();
        assert_eq!(state.config_status, known("converging"));
        assert_eq!(state.current_configuration_id, known("stc-7"));
        assert!(state.config_hash.is_null());
        assert!(fx.platform.uploads().is_empty());

        // Once the outstanding configuration settles, the next apply uploads
        fx.platform.add_configuration("stc-7", Converged, &[]);
        let (plan, _) = fx.plan().await;
        assert_eq!(UpdateAction::classify(&state, &plan), UpdateAction::SourceDrift);
        let response = fx.resource.update(&CancelToken::new(), state, plan).await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state.unwrap();
        assert_eq!(state.current_configuration_id, known("stc-upload-1"));
        assert_eq!(state.config_hash, Value::Known(fx.hash()));
        assert_eq!(fx.platform.uploads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_promptly_with_state() {
        let fx = Fixture::new();
        fx.platform.add_configuration("stc-7", Queued, &[]);
        fx.platform.stall_after_script("stc-7");
        fx.platform.set_latest(STACK_ID, "stc-7");

        let cancel = CancelToken::new();
        cancel.cancel();
        let (plan, _) = fx.plan().await;
        let response = fx.resource.create(&cancel, plan).await;

        assert!(!response.diagnostics.has_error());
        assert!(response.diagnostics.warnings().next().is_some());
        assert_eq!(response.state.unwrap().config_status, known("queued"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_vcs_stack_rejected_at_plan() {
        let fx = Fixture::new();
        fx.platform.set_vcs_driven(STACK_ID);

        let (_, diags) = fx.plan().await;
        let error = diags.errors().next().unwrap();
        assert_eq!(error.summary, "Unsupported stack");
    }

    #[tokio::test(start_paused = true)]
    async fn test_errored_surfaces_remote_diagnostics() {
        let fx = Fixture::new();
        fx.platform.set_upload_script(&[Preparing, Errored]);
        fx.platform
            .add_stack_diagnostic(STACK_ID, "Unsupported argument \"size\"");

        let (plan, _) = fx.plan().await;
        let response = fx.resource.create(&CancelToken::new(), plan).await;

        let error = response.diagnostics.errors().next().unwrap();
        assert_eq!(error.summary, "Stack configuration errored");
        assert!(error.detail.contains("Unsupported argument"));
        assert_eq!(response.state.unwrap().config_status, known("errored"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_canceled_is_error_with_state() {
        let fx = Fixture::new();
        fx.platform.set_upload_script(&[Canceled]);

        let (plan, _) = fx.plan().await;
        let response = fx.resource.create(&CancelToken::new(), plan).await;
        assert!(response.diagnostics.has_error());
        assert_eq!(response.state.unwrap().config_status, known("canceled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_waits_for_outstanding_then_uploads() {
        let fx = Fixture::new();
        let prior = fx.apply_fresh().await;

        fx.platform.add_configuration("stc-9", Converging, &[Converged]);
        fx.platform.set_latest(STACK_ID, "stc-9");
        fx.rewrite("component \"db\" { size = 4 }\n");

        let (plan, _) = fx.plan().await;
        assert_eq!(plan.current_configuration_id, known("stc-9"));
        let response = fx.resource.update(&CancelToken::new(), prior, plan).await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state.unwrap();
        assert_eq!(state.current_configuration_id, known("stc-upload-2"));
        assert_eq!(state.config_hash, Value::Known(fx.hash()));
        assert_eq!(fx.platform.configuration_status("stc-9"), Some(Converged));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_keeps_prior_hash_when_outstanding_stalls() {
        let fx = Fixture::new();
        let prior = fx.apply_fresh().await;

        fx.platform.add_configuration("stc-9", Converging, &[]);
        fx.platform.stall_after_script("stc-9");
        fx.platform.set_latest(STACK_ID, "stc-9");
        fx.rewrite("component \"db\" { size = 5 }\n");

        let (plan, _) = fx.plan().await;
        let prior_hash = prior.config_hash.clone();
        let response = fx.resource.update(&CancelToken::new(), prior, plan).await;

        assert!(!response.diagnostics.has_error());
        let state = response.state.unwrap();
        assert_eq!(state.config_hash, prior_hash);
        assert_eq!(state.current_configuration_id, known("stc-9"));
        assert_eq!(state.config_status, known("converging"));
        assert_eq!(fx.platform.uploads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_status_change_is_accepted_without_polling() {
        let fx = Fixture::new();
        let mut prior = fx.config();
        prior.config_hash = Value::Known(fx.hash());
        prior.set_configuration(Some("stc-3".into()), Some("converging".into()));
        let mut plan = prior.clone();
        plan.config_status = known("converged");

        let response = fx.resource.update(&CancelToken::new(), prior, plan.clone()).await;
        assert_eq!(response.state, Some(plan));
        assert_eq!(fx.platform.configuration_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitional_status_change_is_awaited() {
        let fx = Fixture::new();
        fx.platform.add_configuration("stc-3", Converging, &[Converged]);
        fx.platform.set_latest(STACK_ID, "stc-3");

        let mut prior = fx.config();
        prior.config_hash = Value::Known(fx.hash());
        prior.set_configuration(Some("stc-3".into()), Some("pending".into()));
        let (plan, _) = fx.plan().await;
        assert_eq!(plan.config_status, known("converging"));
        assert_eq!(UpdateAction::classify(&prior, &plan), UpdateAction::StatusChanged);

        let response = fx.resource.update(&CancelToken::new(), prior, plan).await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state.unwrap();
        assert_eq!(state.current_configuration_id, known("stc-3"));
        assert_eq!(state.config_status, known("converged"));
        assert_eq!(fx.platform.watch_count(), 1);
        assert!(fx.platform.uploads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_configuration_id_is_awaited() {
        let fx = Fixture::new();
        let prior = fx.apply_fresh().await;

        fx.platform.add_configuration("stc-9", Queued, &[Converging, Converged]);
        fx.platform.set_latest(STACK_ID, "stc-9");
        let (plan, _) = fx.plan().await;

        let response = fx.resource.update(&CancelToken::new(), prior, plan).await;
        let state = response.state.unwrap();
        assert_eq!(state.current_configuration_id, known("stc-9"));
        assert_eq!(state.config_status, known("converged"));
        assert_eq!(fx.platform.uploads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_drops_missing_stack() {
        let fx = Fixture::new();
        let mut state = fx.config();
        state.name = known("retired");
        let response = fx.resource.read(&CancelToken::new(), state).await;
        assert!(response.state.is_none());
        assert!(!response.diagnostics.has_error());
    }

    #[tokio::test]
    async fn test_delete_only_warns() {
        let fx = Fixture::new();
        let diags = fx.resource.delete(&CancelToken::new(), fx.config()).await;
        assert!(!diags.has_error());
        assert_eq!(diags.warnings().count(), 1);
        assert!(fx.platform.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_create_fails_without_state() {
        let fx = Fixture::new();
        fx.platform.deny_all();
        let response = fx.resource.create(&CancelToken::new(), fx.config()).await;
        assert!(response.state.is_none());
        assert_eq!(
            response.diagnostics.errors().next().unwrap().summary,
            "Authentication failed"
        );
    }

    #[tokio::test]
    async fn test_missing_organization_names_it() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.org = known("globex");
        let response = fx.resource.create(&CancelToken::new(), config).await;
        let error = response.diagnostics.errors().next().unwrap();
        assert!(error.detail.contains("organization 'globex'"), "{}", error.detail);
    }

    #[test]
    #[serial]
    fn test_validate_reports_each_attribute() {
        let fx = Fixture::new();
        let mut config = StackMigrationModel::new("", "ab", "payments", "relative/cfg");
        let diags = temp_env::with_vars_unset([ORG_ENV, PROJECT_ENV], || {
            block_on(fx.resource.validate_config(&mut config))
        });

        assert_eq!(diags.for_attribute(attr::ORG).count(), 1);
        assert_eq!(diags.for_attribute(attr::PROJECT).count(), 1);
        assert_eq!(diags.for_attribute(attr::NAME).count(), 0);
        assert_eq!(diags.for_attribute(attr::CONFIG_FILE_DIR).count(), 1);
    }

    #[test]
    #[serial]
    fn test_validate_applies_env_overrides() {
        let fx = Fixture::new();
        let mut config = fx.config();
        config.org = Value::Null;
        let diags = temp_env::with_vars(
            [(ORG_ENV, Some("globex")), (PROJECT_ENV, Some("platform"))],
            || block_on(fx.resource.validate_config(&mut config)),
        );

        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(config.org, known("globex"));
        assert_eq!(config.project, known("platform"));
    }

    #[test]
    #[serial]
    fn test_validate_falls_back_to_provider_defaults() {
        let platform = Arc::new(FakePlatform::new());
        let resource = StackMigrationResource::new(platform)
            .with_defaults(Some("acme".into()), Some("infra".into()));
        let dir = tempfile::tempdir().unwrap();
        let mut config = StackMigrationModel {
            name: known("payments"),
            config_file_dir: known(dir.path().to_str().unwrap()),
            ..Default::default()
        };

        let diags = temp_env::with_vars_unset([ORG_ENV, PROJECT_ENV], || {
            block_on(resource.validate_config(&mut config))
        });
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(config.org, known("acme"));
        assert_eq!(config.project, known("infra"));
    }

    /// Drive a future on a throwaway runtime inside env-var closures
    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }
}
