//! stackmig plugin framework
//!
//! Host-side abstractions shared by stackmig resources: tri-state attribute
//! values, diagnostics, schemas, the lifecycle trait, plan diffs, and the
//! local state store used when running outside a plugin host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │            host (plugin host / stackmig)         │
//! └─────────────────┬───────────────────────────────┘
//!                   │ validate → modify_plan → create|update → read
//! ┌─────────────────▼───────────────────────────────┐
//! │               stackmig-framework                 │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait Resource { type Model; ... }       │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Plan / Diff │  │  State Mgmt  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!           ┌───────▼────────┐
//!           │ stack migration │
//!           │    resource     │
//!           └────────────────┘
//! ```

pub mod action;
pub mod cancel;
pub mod diagnostic;
pub mod error;
pub mod resource;
pub mod schema;
pub mod state;
pub mod value;

// Re-exports
pub use action::{ActionType, AttributeChange, Plan};
pub use cancel::CancelToken;
pub use diagnostic::{AttributePath, Diagnostic, Diagnostics, Severity};
pub use error::{FrameworkError, Result};
pub use resource::{Resource, ResourceResponse};
pub use schema::{AttributeSchema, Schema};
pub use state::{GlobalState, ResourceState, StateLock, StateManager};
pub use value::Value;
