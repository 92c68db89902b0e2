//! Error types for the LdapMeta core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// A stored value could not be encoded or decoded.
    #[error("invalid stored value for '{key}': {detail}")]
    InvalidValue { key: String, detail: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Mapping store errors
// ---------------------------------------------------------------------------

/// Errors from loading or saving the field mapping configuration.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The settings store or field catalog failed.
    #[error("mapping store error: {0}")]
    Store(#[from] DatabaseError),

    /// The configuration could not be serialized for storage.
    #[error("failed to encode mapping option '{key}': {detail}")]
    Encode { key: String, detail: String },
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from the LDAP directory client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Could not open a connection to the directory server.
    #[error("failed to connect to directory at '{url}': {detail}")]
    ConnectFailed { url: String, detail: String },

    /// The bind was rejected.
    #[error("directory bind failed for '{bind_dn}': {detail}")]
    BindFailed { bind_dn: String, detail: String },

    /// A search returned an error.
    #[error("directory search under '{base_dn}' with filter '{filter}' failed: {detail}")]
    SearchFailed {
        base_dn: String,
        filter: String,
        detail: String,
    },

    /// Underlying ldap3 protocol error.
    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}

// ---------------------------------------------------------------------------
// Alternate DN decoding
// ---------------------------------------------------------------------------

/// An alternate DN that does not decode into exactly a DN and a filter
/// attribute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("alternate DN '{0}' must be of the form 'dn;filter_attribute'")]
pub struct InvalidAltDn(pub String);

// ---------------------------------------------------------------------------
// Resolver errors
// ---------------------------------------------------------------------------

/// Fatal errors raised during an attribute resolution pass.
///
/// Each variant names the field whose mapping entry caused the abort.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The alternate DN is not of the form `dn;filter_attribute`.
    #[error(
        "field '{field}': alternate DN '{alt_dn}' must include a filter attribute \
         (expected 'dn;filter_attribute')"
    )]
    MissingFilterAttribute { field: String, alt_dn: String },

    /// The filter attribute has no value in the base search result.
    #[error(
        "field '{field}': filter attribute '{filter_attr}' for alternate DN '{dn}' \
         was not found in the base search result"
    )]
    FilterValueNotFound {
        field: String,
        filter_attr: String,
        dn: String,
    },

    /// The secondary directory search failed.
    #[error("field '{field}': secondary directory search failed: {source}")]
    Directory {
        field: String,
        #[source]
        source: DirectoryError,
    },
}

impl ResolveError {
    /// Name of the field whose mapping caused the error.
    pub fn field(&self) -> &str {
        match self {
            Self::MissingFilterAttribute { field, .. }
            | Self::FilterValueNotFound { field, .. }
            | Self::Directory { field, .. } => field,
        }
    }
}
