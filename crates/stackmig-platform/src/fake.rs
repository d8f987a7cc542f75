//! In-memory [`StackPlatform`] for tests
//!
//! Configurations follow a scripted list of statuses, one per poll.

use crate::error::{PlatformError, Result};
use crate::model::{ConfigurationStatus, Organization, Project, Stack, StackConfiguration};
use crate::platform::StackPlatform;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use stackmig_archive::Slug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const FAKE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A recorded upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub stack_id: String,
    pub configuration_id: String,
    pub digest: String,
}

#[derive(Debug)]
struct ScriptedConfiguration {
    configuration: StackConfiguration,
    script: VecDeque<ConfigurationStatus>,
    /// Keep repeating the current status once the script runs out
    stall: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    organizations: Vec<String>,
    projects: Vec<(String, Project)>,
    stacks: Vec<(String, Stack)>,
    latest: HashMap<String, String>,
    configurations: HashMap<String, ScriptedConfiguration>,
    upload_script: Vec<ConfigurationStatus>,
    uploads: Vec<Upload>,
    configuration_reads: usize,
    watches: usize,
    next_id: usize,
    unauthorized: bool,
}

#[derive(Debug)]
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                upload_script: vec![
                    ConfigurationStatus::Preparing,
                    ConfigurationStatus::Converging,
                    ConfigurationStatus::Converged,
                ],
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Organization `org` with project `project` (id `prj-<project>`)
    /// containing an empty CLI-driven stack `stack` (id `st-<stack>`)
    pub fn with_stack(org: &str, project: &str, stack: &str) -> Self {
        let platform = Self::new();
        platform.add_organization(org);
        platform.add_project(org, &format!("prj-{}", project), project);
        platform.add_stack(org, &format!("prj-{}", project), &format!("st-{}", stack), stack);
        platform
    }

    pub fn add_organization(&self, name: &str) {
        self.lock().organizations.push(name.to_string());
    }

    pub fn add_project(&self, organization: &str, id: &str, name: &str) {
        self.lock().projects.push((
            organization.to_string(),
            Project {
                id: id.to_string(),
                name: name.to_string(),
            },
        ));
    }

    pub fn add_stack(&self, organization: &str, project_id: &str, id: &str, name: &str) {
        self.lock().stacks.push((
            organization.to_string(),
            Stack {
                id: id.to_string(),
                name: name.to_string(),
                project_id: project_id.to_string(),
                vcs_driven: false,
                deployment_names: Vec::new(),
                latest_configuration: None,
                diagnostics: Vec::new(),
            },
        ));
    }

    pub fn set_vcs_driven(&self, stack_id: &str) {
        if let Some((_, stack)) = self.lock().stacks.iter_mut().find(|(_, s)| s.id == stack_id) {
            stack.vcs_driven = true;
        }
    }

    pub fn add_stack_diagnostic(&self, stack_id: &str, summary: &str) {
        if let Some((_, stack)) = self.lock().stacks.iter_mut().find(|(_, s)| s.id == stack_id) {
            stack.diagnostics.push(crate::model::RemoteDiagnostic {
                severity: "error".to_string(),
                summary: summary.to_string(),
                detail: String::new(),
            });
        }
    }

    /// Register a configuration whose status follows `script` on each poll
    pub fn add_configuration(
        &self,
        id: &str,
        status: ConfigurationStatus,
        script: &[ConfigurationStatus],
    ) {
        self.lock().configurations.insert(
            id.to_string(),
            ScriptedConfiguration {
                configuration: StackConfiguration {
                    id: id.to_string(),
                    status,
                    sequence_number: None,
                    deployment_names: Vec::new(),
                },
                script: script.iter().copied().collect(),
                stall: false,
            },
        );
    }

    /// Make `configuration_id` the stack's latest configuration
    pub fn set_latest(&self, stack_id: &str, configuration_id: &str) {
        self.lock()
            .latest
            .insert(stack_id.to_string(), configuration_id.to_string());
    }

    pub fn set_deployments(&self, configuration_id: &str, names: &[&str]) {
        if let Some(c) = self.lock().configurations.get_mut(configuration_id) {
            c.configuration.deployment_names = names.iter().map(|n| n.to_string()).collect();
        }
    }

    /// Keep reporting the current status forever after the script runs out
    pub fn stall_after_script(&self, configuration_id: &str) {
        if let Some(c) = self.lock().configurations.get_mut(configuration_id) {
            c.stall = true;
        }
    }

    /// Status script for configurations created by future uploads
    pub fn set_upload_script(&self, script: &[ConfigurationStatus]) {
        self.lock().upload_script = script.to_vec();
    }

    /// Reject every request as unauthorized
    pub fn deny_all(&self) {
        self.lock().unauthorized = true;
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.lock().uploads.clone()
    }

    pub fn configuration_reads(&self) -> usize {
        self.lock().configuration_reads
    }

    pub fn watch_count(&self) -> usize {
        self.lock().watches
    }

    pub fn configuration_status(&self, id: &str) -> Option<ConfigurationStatus> {
        self.lock()
            .configurations
            .get(id)
            .map(|c| c.configuration.status)
    }

    fn check_auth(state: &FakeState) -> Result<()> {
        if state.unauthorized {
            return Err(PlatformError::Unauthorized("fake platform denies all".to_string()));
        }
        Ok(())
    }

    /// Advance the script by one poll; `None` once the stream should end
    fn poll(&self, configuration_id: &str) -> Option<Result<ConfigurationStatus>> {
        let mut state = self.lock();
        if let Err(e) = Self::check_auth(&state) {
            return Some(Err(e));
        }
        let Some(scripted) = state.configurations.get_mut(configuration_id) else {
            return Some(Err(PlatformError::NotFound(format!(
                "stack configuration {}",
                configuration_id
            ))));
        };

        match scripted.script.pop_front() {
            Some(status) => {
                scripted.configuration.status = status;
                Some(Ok(status))
            }
            None if scripted.stall => Some(Ok(scripted.configuration.status)),
            None => None,
        }
    }
}

#[async_trait]
impl StackPlatform for FakePlatform {
    async fn read_organization(&self, name: &str) -> Result<Organization> {
        let state = self.lock();
        Self::check_auth(&state)?;
        state
            .organizations
            .iter()
            .find(|o| *o == name)
            .map(|o| Organization { name: o.clone() })
            .ok_or_else(|| PlatformError::NotFound(format!("organization '{}'", name)))
    }

    async fn read_project(&self, organization: &str, name: &str) -> Result<Project> {
        let state = self.lock();
        Self::check_auth(&state)?;
        state
            .projects
            .iter()
            .find(|(org, p)| org == organization && p.name == name)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("project '{}'", name)))
    }

    async fn read_stack(&self, organization: &str, project_id: &str, name: &str) -> Result<Stack> {
        let state = self.lock();
        Self::check_auth(&state)?;
        let mut stack = state
            .stacks
            .iter()
            .find(|(org, s)| org == organization && s.project_id == project_id && s.name == name)
            .map(|(_, s)| s.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("stack '{}'", name)))?;

        stack.latest_configuration = state
            .latest
            .get(&stack.id)
            .and_then(|id| state.configurations.get(id))
            .map(|c| c.configuration.clone());
        Ok(stack)
    }

    async fn upload_configuration(&self, stack_id: &str, slug: &Slug) -> Result<String> {
        let digest = slug.digest();

        let mut guard = self.lock();
        let state = &mut *guard;
        Self::check_auth(state)?;
        if !state.stacks.iter().any(|(_, s)| s.id == stack_id) {
            return Err(PlatformError::NotFound(format!("stack {}", stack_id)));
        }

        state.next_id += 1;
        let configuration_id = format!("stc-upload-{}", state.next_id);
        let script = state.upload_script.iter().copied().collect();
        state.configurations.insert(
            configuration_id.clone(),
            ScriptedConfiguration {
                configuration: StackConfiguration {
                    id: configuration_id.clone(),
                    status: ConfigurationStatus::Pending,
                    sequence_number: Some(state.next_id as u64),
                    deployment_names: Vec::new(),
                },
                script,
                stall: false,
            },
        );
        state
            .latest
            .insert(stack_id.to_string(), configuration_id.clone());
        state.uploads.push(Upload {
            stack_id: stack_id.to_string(),
            configuration_id: configuration_id.clone(),
            digest,
        });

        Ok(configuration_id)
    }

    async fn read_configuration(&self, configuration_id: &str) -> Result<StackConfiguration> {
        let mut state = self.lock();
        Self::check_auth(&state)?;
        state.configuration_reads += 1;
        state
            .configurations
            .get(configuration_id)
            .map(|c| c.configuration.clone())
            .ok_or_else(|| {
                PlatformError::NotFound(format!("stack configuration {}", configuration_id))
            })
    }

    fn watch_configuration<'a>(
        &'a self,
        configuration_id: &'a str,
    ) -> BoxStream<'a, Result<ConfigurationStatus>> {
        self.lock().watches += 1;
        Box::pin(stream::unfold(true, move |live| async move {
            if !live {
                return None;
            }
            tokio::time::sleep(FAKE_POLL_INTERVAL).await;
            let update = self.poll(configuration_id)?;
            let keep_going = matches!(&update, Ok(status) if !status.is_terminal());
            Some((update, keep_going))
        }))
    }
}
