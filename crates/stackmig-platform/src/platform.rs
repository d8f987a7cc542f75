//! Platform capability trait

use crate::error::Result;
use crate::model::{ConfigurationStatus, Organization, Project, Stack, StackConfiguration};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use stackmig_archive::Slug;

/// Operations the stack migration resource needs from the platform.
///
/// The HTTP client implements this against the REST API; tests inject an
/// in-memory implementation.
#[async_trait]
pub trait StackPlatform: Send + Sync {
    async fn read_organization(&self, name: &str) -> Result<Organization>;

    /// Find a project by exact name within an organization
    async fn read_project(&self, organization: &str, name: &str) -> Result<Project>;

    /// Find a stack by exact name within a project, with its latest
    /// configuration and diagnostics expanded
    async fn read_stack(&self, organization: &str, project_id: &str, name: &str) -> Result<Stack>;

    /// Upload a packed directory as a new, non-speculative configuration.
    /// Returns the new configuration id.
    async fn upload_configuration(&self, stack_id: &str, slug: &Slug) -> Result<String>;

    async fn read_configuration(&self, configuration_id: &str) -> Result<StackConfiguration>;

    /// Status updates for a configuration. The stream ends after the first
    /// terminal status.
    fn watch_configuration<'a>(
        &'a self,
        configuration_id: &'a str,
    ) -> BoxStream<'a, Result<ConfigurationStatus>>;
}
