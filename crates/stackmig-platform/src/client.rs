//! HTTP implementation of [`StackPlatform`]
//!
//! Talks to the platform's JSON:API with bearer-token authentication.

use crate::error::{PlatformError, Result};
use crate::jsonapi::{
    self, ConfigurationAttributes, CreateStackSource, Document, OrganizationAttributes,
    ProjectAttributes, Resource, StackAttributes, StackSourceAttributes,
};
use crate::model::{ConfigurationStatus, Organization, Project, Stack, StackConfiguration};
use crate::platform::StackPlatform;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use stackmig_archive::Slug;
use std::time::Duration;

const API_PATH: &str = "api/v2";
const CONTENT_TYPE: &str = "application/vnd.api+json";
const STACK_INCLUDES: &str = "latest_stack_configuration,stack_diagnostics";
const PAGE_SIZE: &str = "100";

/// Interval between configuration status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Connection settings for [`HttpPlatform`]
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL including the API path, e.g. `https://app.terraform.io/api/v2`
    pub base_url: String,
    pub token: String,
    pub ssl_skip_verify: bool,
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn for_host(hostname: &str, token: impl Into<String>) -> Self {
        Self {
            base_url: format!("https://{}/{}", hostname, API_PATH),
            token: token.into(),
            ssl_skip_verify: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_ssl_skip_verify(mut self, skip: bool) -> Self {
        self.ssl_skip_verify = skip;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Platform client over HTTP
pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: Url,
    token: String,
    poll_interval: Duration,
}

impl HttpPlatform {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| PlatformError::Decode(format!("invalid base URL: {}", e)))?;

        if config.ssl_skip_verify {
            tracing::warn!("TLS certificate verification is disabled");
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("stackmig/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.ssl_skip_verify)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.token,
            poll_interval: config.poll_interval,
        })
    }

    /// URL for the given path segments below the API root. Segments are
    /// percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PlatformError::Decode("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        tracing::trace!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .query(query)
            .send()
            .await?;

        let response = check_status(response, what).await?;
        decode(response, what).await
    }

    /// Walk a paginated collection until `matches` picks an entry or the
    /// pages run out. Returns the entry with its page's `included` section.
    async fn find_paged<A: DeserializeOwned + Send>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        what: &str,
        matches: impl Fn(&Resource<A>) -> bool + Send,
    ) -> Result<Option<(Resource<A>, Vec<Resource<serde_json::Value>>)>> {
        let mut page = 1u32;
        loop {
            let number = page.to_string();
            let mut paged = query.to_vec();
            paged.push(("page[number]", &number));
            paged.push(("page[size]", PAGE_SIZE));

            let doc: Document<Vec<Resource<A>>> = self.get(url.clone(), &paged, what).await?;
            let next = doc.next_page();
            if let Some(found) = doc.data.into_iter().find(|r| matches(r)) {
                return Ok(Some((found, doc.included)));
            }

            match next {
                Some(next) if next > page => {
                    tracing::trace!(page = next, "no exact match yet, reading next page");
                    page = next;
                }
                _ => return Ok(None),
            }
        }
    }
}

/// Map non-success statuses onto [`PlatformError`]
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(PlatformError::Unauthorized(format!(
            "credentials rejected while reading {}",
            what
        ))),
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound(what.to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::Api {
                status: status.as_u16(),
                message: jsonapi::error_message(&body),
            })
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| PlatformError::Decode(format!("{}: {}", what, e)))
}

#[async_trait]
impl StackPlatform for HttpPlatform {
    async fn read_organization(&self, name: &str) -> Result<Organization> {
        let what = format!("organization '{}'", name);
        let url = self.endpoint(&["organizations", name])?;
        let doc: Document<Resource<OrganizationAttributes>> = self.get(url, &[], &what).await?;

        Ok(Organization {
            name: doc.data.attributes.name,
        })
    }

    async fn read_project(&self, organization: &str, name: &str) -> Result<Project> {
        let what = format!("project '{}' in organization '{}'", name, organization);
        let url = self.endpoint(&["organizations", organization, "projects"])?;
        let found = self
            .find_paged::<ProjectAttributes>(url, &[("filter[names]", name)], &what, |p| {
                p.attributes.name == name
            })
            .await?;

        found
            .map(|(p, _)| Project {
                id: p.id,
                name: p.attributes.name,
            })
            .ok_or(PlatformError::NotFound(what))
    }

    async fn read_stack(&self, organization: &str, project_id: &str, name: &str) -> Result<Stack> {
        let what = format!("stack '{}' in project {}", name, project_id);
        let url = self.endpoint(&["organizations", organization, "stacks"])?;
        // search[name] is a substring match; keep paging until the exact name
        let query = [
            ("filter[project[id]]", project_id),
            ("search[name]", name),
            ("include", STACK_INCLUDES),
        ];
        let (resource, included) = self
            .find_paged::<StackAttributes>(url, &query, &what, |s| s.attributes.name == name)
            .await?
            .ok_or_else(|| PlatformError::NotFound(what.clone()))?;

        let (mut stack, unresolved) = jsonapi::stack_from(resource, &included)?;
        if let Some(configuration_id) = unresolved {
            tracing::debug!(
                stack_id = %stack.id,
                configuration_id = %configuration_id,
                "latest configuration not expanded, reading it"
            );
            stack.latest_configuration = Some(self.read_configuration(&configuration_id).await?);
        }

        tracing::debug!(
            stack_id = %stack.id,
            vcs_driven = stack.vcs_driven,
            latest = ?stack.latest_configuration.as_ref().map(|c| (&c.id, c.status)),
            "read stack"
        );
        Ok(stack)
    }

    async fn upload_configuration(&self, stack_id: &str, slug: &Slug) -> Result<String> {
        let what = format!("stack {}", stack_id);
        let payload = slug.gzip()?;

        let url = self.endpoint(&["stacks", stack_id, "stack-sources"])?;
        tracing::debug!(url = %url, "creating stack source");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&CreateStackSource::non_speculative())
            .send()
            .await?;
        let response = check_status(response, &what).await?;
        let doc: Document<Resource<StackSourceAttributes>> = decode(response, &what).await?;

        let configuration_id = doc
            .data
            .related_id("stack-configuration")
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::Decode("stack source has no stack configuration".to_string())
            })?;
        let upload_url = doc.data.attributes.upload_url.ok_or_else(|| {
            PlatformError::Decode("stack source has no upload URL".to_string())
        })?;

        tracing::info!(
            stack_id = %stack_id,
            configuration_id = %configuration_id,
            bytes = payload.len(),
            "uploading configuration"
        );
        // The upload URL is pre-signed and takes no bearer token
        let response = self
            .client
            .put(&upload_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await?;
        check_status(response, "configuration upload").await?;

        Ok(configuration_id)
    }

    async fn read_configuration(&self, configuration_id: &str) -> Result<StackConfiguration> {
        let what = format!("stack configuration {}", configuration_id);
        let url = self.endpoint(&["stack-configurations", configuration_id])?;
        let doc: Document<Resource<ConfigurationAttributes>> = self.get(url, &[], &what).await?;
        Ok(jsonapi::configuration_from(doc.data))
    }

    fn watch_configuration<'a>(
        &'a self,
        configuration_id: &'a str,
    ) -> BoxStream<'a, Result<ConfigurationStatus>> {
        let interval = self.poll_interval;
        // State: Some(first_poll) while the stream is live
        Box::pin(stream::unfold(Some(true), move |state| async move {
            let first = state?;
            if !first {
                tokio::time::sleep(interval).await;
            }
            match self.read_configuration(configuration_id).await {
                Ok(configuration) => {
                    let next = (!configuration.status.is_terminal()).then_some(false);
                    Some((Ok(configuration.status), next))
                }
                Err(e) => Some((Err(e), None)),
            }
        }))
    }
}
