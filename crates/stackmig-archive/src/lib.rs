//! Configuration directory validation, packing, and content hashing

pub mod error;
pub mod path;
pub mod slug;

pub use error::{ArchiveError, Result};
pub use path::check_directory;
pub use slug::{Slug, hash_directory};
