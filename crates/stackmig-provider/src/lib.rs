//! Stack migration provider
//!
//! The `tfmigrate_stack_migration` resource uploads a local configuration
//! directory to an existing stack and follows the resulting stack
//! configuration until it converges.
//!
//! ```text
//! validate ──▶ modify_plan ──▶ create / update ──▶ read
//!    │              │                 │
//!    │         hash + stack      admission table
//!    │           lookup          upload, await
//!    ▼
//! identifiers, config_file_dir
//! ```

pub mod admission;
pub mod error;
pub mod model;
pub mod provider;
pub mod resource;
pub mod update;
pub mod validators;

pub use admission::Admission;
pub use error::{ProviderError, Result};
pub use model::{StackMigrationModel, schema};
pub use provider::Provider;
pub use resource::{StackMigrationResource, TYPE_NAME};
pub use update::UpdateAction;
