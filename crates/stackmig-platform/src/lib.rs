//! Stacks platform client
//!
//! A typed client over the platform's REST API for the operations the
//! stack migration resource needs: organization, project, and stack
//! lookup, configuration upload, and waiting for a configuration to
//! complete.
//!
//! # Example
//!
//! ```ignore
//! use stackmig_archive::Slug;
//! use stackmig_platform::{ClientConfig, HttpPlatform, StackPlatform, await_completion, AWAIT_TIMEOUT};
//!
//! let platform = HttpPlatform::new(ClientConfig::for_host("app.terraform.io", token))?;
//! let project = platform.read_project("acme", "infra").await?;
//! let stack = platform.read_stack("acme", &project.id, "payments").await?;
//!
//! let slug = Slug::pack(dir)?;
//! let id = platform.upload_configuration(&stack.id, &slug).await?;
//! let completion = await_completion(&platform, &id, &cancel, AWAIT_TIMEOUT).await?;
//! ```

pub mod client;
pub mod completion;
pub mod error;
mod jsonapi;
pub mod model;
pub mod platform;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use client::{ClientConfig, DEFAULT_POLL_INTERVAL, HttpPlatform};
pub use completion::{AWAIT_TIMEOUT, Completion, await_completion};
pub use error::{PlatformError, Result};
pub use model::{
    ConfigurationStatus, Organization, Project, RemoteDiagnostic, Stack, StackConfiguration,
};
pub use platform::StackPlatform;
