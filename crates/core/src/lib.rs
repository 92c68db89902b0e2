//! LdapMeta core library.
//!
//! Maintains the mapping between user-profile metadata fields and LDAP
//! attributes, and resolves field values from directory search results:
//! configuration, SQLite-backed settings and user-meta storage, the mapping
//! store, the directory client, and the attribute resolver.

pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod mapping;
pub mod resolver;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use directory::{DirectoryClient, DirectorySearchResult, LdapDirectory};
pub use mapping::{FieldMapping, MappingConfiguration, MappingStore};
pub use resolver::{AttributeResolver, ResolvedUserData};
