//! TOML-based configuration system for LdapMeta.
//!
//! The directory bind password is stored as an `_env` field that references an
//! environment variable name. The actual secret is resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::mapping::MappingOptions;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging and storage settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// LDAP directory connection settings.
    pub directory: DirectoryConfig,

    /// Mapping option key and form field prefixes.
    #[serde(default)]
    pub mapping: MappingConfig,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// Logging and storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// SQLite database holding the settings and user-meta tables.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_database() -> PathBuf {
    PathBuf::from("/var/lib/ldapmeta/ldapmeta.db")
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database: default_database(),
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// LDAP server connection and base search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// LDAP server URL (e.g. `ldap://ldap.example.com`).
    pub url: String,

    /// Base DN for user searches.
    pub base_dn: String,

    /// Bind DN for authenticated queries. Anonymous bind when unset.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Environment variable holding the bind password.
    #[serde(default)]
    pub bind_password_env: Option<String>,

    /// Filter used for the base user search; `{username}` is substituted.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Resolved bind password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_user_filter() -> String {
    "(uid={username})".into()
}
fn default_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Where the mapping configuration lives and how form fields are named.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Settings-store key holding the mapping configuration.
    #[serde(default = "default_option_key")]
    pub option_key: String,

    /// Form field prefix for the alternate DN of a field.
    #[serde(default = "default_alt_dn_prefix")]
    pub alt_dn_prefix: String,

    /// Form field prefix for the LDAP attribute of a field.
    #[serde(default = "default_ldap_attr_prefix")]
    pub ldap_attr_prefix: String,
}

fn default_option_key() -> String {
    crate::mapping::DEFAULT_OPTION_KEY.into()
}
fn default_alt_dn_prefix() -> String {
    crate::mapping::ALT_DN_PREFIX.into()
}
fn default_ldap_attr_prefix() -> String {
    crate::mapping::LDAP_ATTR_PREFIX.into()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            option_key: default_option_key(),
            alt_dn_prefix: default_alt_dn_prefix(),
            ldap_attr_prefix: default_ldap_attr_prefix(),
        }
    }
}

impl MappingConfig {
    /// Build the [`MappingOptions`] consumed by the mapping store.
    pub fn to_options(&self) -> MappingOptions {
        MappingOptions {
            option_key: self.option_key.clone(),
            alt_dn_prefix: self.alt_dn_prefix.clone(),
            ldap_attr_prefix: self.ldap_attr_prefix.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does **not** fail; the client
    /// then binds with an empty password.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.directory.bind_password_env {
            self.directory.bind_password =
                resolve_optional_env(env_name, "directory.bind_password_env");
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.url.trim().is_empty() {
            return Err(invalid("directory.url", "LDAP URL must not be empty"));
        }
        if self.directory.base_dn.trim().is_empty() {
            return Err(invalid("directory.base_dn", "base DN must not be empty"));
        }
        if !self.directory.user_filter.contains("{username}") {
            return Err(invalid(
                "directory.user_filter",
                "user filter must contain the '{username}' placeholder",
            ));
        }
        if self.directory.timeout_secs == 0 {
            return Err(invalid("directory.timeout_secs", "timeout must be > 0"));
        }
        if self.mapping.option_key.is_empty() {
            return Err(invalid("mapping.option_key", "option key must not be empty"));
        }
        if self.mapping.alt_dn_prefix.is_empty() || self.mapping.ldap_attr_prefix.is_empty() {
            return Err(invalid("mapping", "form field prefixes must not be empty"));
        }
        if self.mapping.alt_dn_prefix == self.mapping.ldap_attr_prefix {
            return Err(invalid(
                "mapping.ldap_attr_prefix",
                "form field prefixes must differ",
            ));
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Render a commented default configuration file.
    pub fn default_toml() -> String {
        format!(
            r#"# LdapMeta configuration

[general]
log_level = "info"
database = "{database}"

[directory]
url = "ldap://ldap.example.com"
base_dn = "ou=people,dc=example,dc=com"
# bind_dn = "cn=reader,dc=example,dc=com"
# bind_password_env = "LDAPMETA_BIND_PASSWORD"
user_filter = "{user_filter}"
timeout_secs = {timeout}

[mapping]
option_key = "{option_key}"
alt_dn_prefix = "{alt_dn_prefix}"
ldap_attr_prefix = "{ldap_attr_prefix}"
"#,
            database = default_database().display(),
            user_filter = default_user_filter(),
            timeout = default_timeout(),
            option_key = default_option_key(),
            alt_dn_prefix = default_alt_dn_prefix(),
            ldap_attr_prefix = default_ldap_attr_prefix(),
        )
    }
}

fn invalid(field: &str, detail: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        detail: detail.into(),
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
