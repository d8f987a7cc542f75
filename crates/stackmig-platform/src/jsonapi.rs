//! JSON:API wire types

use crate::error::{PlatformError, Result};
use crate::model::{RemoteDiagnostic, Stack, StackConfiguration};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub(crate) struct Document<T> {
    pub data: T,
    #[serde(default)]
    pub included: Vec<Resource<serde_json::Value>>,
    #[serde(default)]
    pub meta: Meta,
}

impl<T> Document<T> {
    /// Page number to request next, if the collection has more pages
    pub fn next_page(&self) -> Option<u32> {
        self.meta.pagination.as_ref().and_then(|p| p.next_page)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Pagination {
    #[serde(default)]
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Resource<A> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: A,
    #[serde(default)]
    pub relationships: HashMap<String, Relationship>,
}

impl<A> Resource<A> {
    /// Id of a to-one relationship, if present and non-null
    pub fn related_id(&self, name: &str) -> Option<&str> {
        self.relationships
            .get(name)
            .and_then(|r| r.data.as_ref())
            .map(|d| d.id.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Relationship {
    #[serde(default)]
    pub data: Option<ResourceIdentifier>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceIdentifier {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDocument {
    #[serde(default)]
    pub errors: Vec<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorObject {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// First error in a JSON:API error body, or the raw body
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorDocument>(body)
        .ok()
        .and_then(|doc| doc.errors.into_iter().next())
        .and_then(|e| match (e.title, e.detail) {
            (Some(title), Some(detail)) => Some(format!("{}: {}", title, detail)),
            (title, detail) => title.or(detail),
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Deserialize)]
pub(crate) struct OrganizationAttributes {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectAttributes {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StackAttributes {
    pub name: String,
    #[serde(default)]
    pub vcs_repo: Option<serde_json::Value>,
    #[serde(default)]
    pub deployment_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ConfigurationAttributes {
    pub status: crate::model::ConfigurationStatus,
    #[serde(default)]
    pub sequence_number: Option<u64>,
    #[serde(default)]
    pub deployment_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StackSourceAttributes {
    #[serde(default)]
    pub upload_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateStackSource {
    pub data: CreateStackSourceData,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateStackSourceData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: CreateStackSourceAttributes,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateStackSourceAttributes {
    pub speculative: bool,
}

impl CreateStackSource {
    pub fn non_speculative() -> Self {
        Self {
            data: CreateStackSourceData {
                kind: "stack-sources",
                attributes: CreateStackSourceAttributes { speculative: false },
            },
        }
    }
}

pub(crate) fn configuration_from(resource: Resource<ConfigurationAttributes>) -> StackConfiguration {
    StackConfiguration {
        id: resource.id,
        status: resource.attributes.status,
        sequence_number: resource.attributes.sequence_number,
        deployment_names: resource.attributes.deployment_names,
    }
}

fn decode_included<A: DeserializeOwned>(resource: &Resource<serde_json::Value>) -> Result<A> {
    serde_json::from_value(resource.attributes.clone()).map_err(|e| {
        PlatformError::Decode(format!("{} {}: {}", resource.kind, resource.id, e))
    })
}

/// Build a [`Stack`], resolving the latest configuration and diagnostics
/// from the `included` section.
pub(crate) fn stack_from(
    resource: Resource<StackAttributes>,
    included: &[Resource<serde_json::Value>],
) -> Result<(Stack, Option<String>)> {
    let latest_id = resource
        .related_id("latest-stack-configuration")
        .map(str::to_string);

    let latest_configuration = match &latest_id {
        Some(id) => included
            .iter()
            .find(|r| r.kind == "stack-configurations" && &r.id == id)
            .map(|r| {
                decode_included::<ConfigurationAttributes>(r).map(|attributes| {
                    configuration_from(Resource {
                        id: r.id.clone(),
                        kind: r.kind.clone(),
                        attributes,
                        relationships: HashMap::new(),
                    })
                })
            })
            .transpose()?,
        None => None,
    };

    let diagnostics = included
        .iter()
        .filter(|r| r.kind == "stack-diagnostics")
        .map(decode_included::<RemoteDiagnostic>)
        .collect::<Result<Vec<_>>>()?;

    let stack = Stack {
        project_id: resource
            .related_id("project")
            .map(str::to_string)
            .unwrap_or_default(),
        id: resource.id,
        name: resource.attributes.name,
        vcs_driven: resource
            .attributes
            .vcs_repo
            .as_ref()
            .is_some_and(|v| !v.is_null()),
        deployment_names: resource.attributes.deployment_names,
        latest_configuration,
        diagnostics,
    };

    // Latest id that was referenced but not expanded
    let unresolved = match (&latest_id, &stack.latest_configuration) {
        (Some(id), None) => Some(id.clone()),
        _ => None,
    };

    Ok((stack, unresolved))
}
