//! Local Mirror Store
//!
//! A single-table SQLite store of campaign view models keyed by campaign
//! address. The refresh path writes it; the CLI reads it for offline
//! listings and `show`.
//!
//! - **mirror**: [`MirrorStore`]
//! - **error**: [`StoreError`]

pub mod error;
pub mod mirror;

pub use error::{StoreError, StoreResult};
pub use mirror::{MirrorStore, DB_FILE, SCHEMA_VERSION};
