//! Slicemock Common Library
//!
//! Shared data model for the storefront mock: identities and role tags,
//! the menu, orders, franchises and their stores, ordered entity
//! collections with filtering and pagination, and the seed fixtures a
//! scenario starts from.

pub mod collection;
pub mod error;
pub mod seed;
pub mod types;

// Re-export commonly used types
pub use collection::{EntityCollection, NameFilter, Page, PageRequest, Record};
pub use error::{Error, Result};
pub use seed::Seed;
pub use types::*;

/// Slicemock version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
