//! # kc-core
//!
//! Shared foundation types for the Knowledge Commons sync services:
//!
//! - [`ids`] - Type-safe identifiers (`ProfileId`, `RoleId`)
//! - [`system`] - The [`SyncSystem`] enum naming each external membership system
//! - [`email`] - Email address syntax validation
//! - [`version`] - The release version tag used for cache versioning

pub mod email;
pub mod ids;
pub mod system;
pub mod version;

pub use email::{validate_email, EmailError};
pub use ids::{ParseIdError, ProfileId, RoleId};
pub use system::SyncSystem;
pub use version::RELEASE_VERSION;
