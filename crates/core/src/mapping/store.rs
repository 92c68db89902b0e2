//! Loading, editing and saving the mapping configuration.
//!
//! [`MappingStore`] keeps the configuration in step with the live set of
//! user-meta field names. The settings store and field catalog are injected,
//! so any backend (the bundled SQLite [`Database`](crate::db::Database), or
//! a host application's own) can be used.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{is_excluded, FieldMapping, MappingConfiguration, MappingOptions};
use crate::errors::{DatabaseError, MappingError};

/// Key-value settings store holding JSON option values.
pub trait SettingsStore {
    /// Read an option, `None` if it has never been written.
    fn get_option(&self, key: &str) -> Result<Option<Value>, DatabaseError>;

    /// Replace an option's value.
    fn update_option(&self, key: &str, value: &Value) -> Result<(), DatabaseError>;
}

/// Source of the user-meta field names currently in use.
pub trait FieldCatalog {
    /// Distinct meta keys across all users. May contain duplicates.
    fn list_distinct_meta_keys(&self) -> Result<Vec<String>, DatabaseError>;
}

impl<T: SettingsStore + ?Sized> SettingsStore for &T {
    fn get_option(&self, key: &str) -> Result<Option<Value>, DatabaseError> {
        (**self).get_option(key)
    }

    fn update_option(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
        (**self).update_option(key, value)
    }
}

impl<T: FieldCatalog + ?Sized> FieldCatalog for &T {
    fn list_distinct_meta_keys(&self) -> Result<Vec<String>, DatabaseError> {
        (**self).list_distinct_meta_keys()
    }
}

/// Mapping store adapter over an injected settings store and field catalog.
pub struct MappingStore<S, C> {
    settings: S,
    catalog: C,
    options: MappingOptions,
}

impl<S: SettingsStore, C: FieldCatalog> MappingStore<S, C> {
    /// Create a store using the default option key and form prefixes.
    pub fn new(settings: S, catalog: C) -> Self {
        Self::with_options(settings, catalog, MappingOptions::default())
    }

    pub fn with_options(settings: S, catalog: C, options: MappingOptions) -> Self {
        Self {
            settings,
            catalog,
            options,
        }
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// Current mappable field names: deduplicated, denylist removed, sorted.
    pub fn load_field_names(&self) -> Result<Vec<String>, MappingError> {
        let mut names: Vec<String> = self
            .catalog
            .list_distinct_meta_keys()?
            .into_iter()
            .filter(|name| !is_excluded(name))
            .collect();
        names.sort();
        names.dedup();
        debug!(count = names.len(), "loaded mappable field names");
        Ok(names)
    }

    /// Load the stored configuration, or synthesize an empty one.
    ///
    /// A synthesized configuration is not written back; call
    /// [`persist`](Self::persist) for that. Stored entries for denylisted
    /// fields are dropped. Entries for fields that have since disappeared
    /// from the catalog are kept (see [`prune_stale`](Self::prune_stale)).
    pub fn load_mapping(&self) -> Result<MappingConfiguration, MappingError> {
        let key = &self.options.option_key;
        let stored = match self.settings.get_option(key)? {
            Some(Value::Object(map)) if !map.is_empty() => Some(map),
            Some(Value::Object(_)) | None => None,
            Some(other) => {
                warn!(
                    option = %key,
                    kind = value_kind(&other),
                    "stored mapping option is not an object, using defaults"
                );
                None
            }
        };

        let config = match stored {
            Some(map) => {
                let config: MappingConfiguration = map
                    .iter()
                    .filter(|(name, _)| !is_excluded(name))
                    .map(|(name, entry)| (name.clone(), FieldMapping::from_stored(entry)))
                    .collect();
                debug!(
                    option = %key,
                    stored = map.len(),
                    kept = config.len(),
                    "loaded stored mapping configuration"
                );
                config
            }
            None => {
                info!(option = %key, "no stored mapping configuration, using empty mappings");
                self.load_field_names()?
                    .into_iter()
                    .map(|name| (name, FieldMapping::default()))
                    .collect()
            }
        };

        Ok(config)
    }

    /// Apply submitted form input to `config`.
    ///
    /// Every current field name gets its entry replaced by the form's
    /// `<alt_dn_prefix><field>` and `<ldap_attr_prefix><field>` values,
    /// lower-cased and trimmed. Missing or non-string values become empty.
    /// Entries for fields outside the catalog are left as they are. Input that
    /// is not an object leaves the configuration unchanged.
    pub fn apply_submitted_mapping(
        &self,
        config: &MappingConfiguration,
        form: &Value,
    ) -> Result<MappingConfiguration, MappingError> {
        let mut updated = config.clone();

        let Some(form) = form.as_object() else {
            warn!(kind = value_kind(form), "submitted mapping form is not an object, ignoring");
            return Ok(updated);
        };

        let field = |prefix: &str, name: &str| -> String {
            form.get(&format!("{prefix}{name}"))
                .and_then(Value::as_str)
                .map(|v| v.to_lowercase().trim().to_string())
                .unwrap_or_default()
        };

        for name in self.load_field_names()? {
            let entry = FieldMapping {
                alt_dn: field(&self.options.alt_dn_prefix, &name),
                ldap_attr: field(&self.options.ldap_attr_prefix, &name),
            };
            updated.insert(name, entry);
        }

        debug!(fields = updated.len(), "applied submitted mapping form");
        Ok(updated)
    }

    /// Write the whole configuration under the option key.
    pub fn persist(&self, config: &MappingConfiguration) -> Result<(), MappingError> {
        let key = &self.options.option_key;
        let value = serde_json::to_value(config).map_err(|e| MappingError::Encode {
            key: key.clone(),
            detail: e.to_string(),
        })?;
        self.settings.update_option(key, &value)?;
        info!(option = %key, fields = config.len(), "saved mapping configuration");
        Ok(())
    }

    /// Drop entries whose field name is no longer in the catalog.
    ///
    /// [`load_mapping`](Self::load_mapping) never does this on its own.
    pub fn prune_stale(
        &self,
        config: &MappingConfiguration,
    ) -> Result<MappingConfiguration, MappingError> {
        let names = self.load_field_names()?;
        let pruned: MappingConfiguration = config
            .iter()
            .filter(|(name, _)| names.binary_search(*name).is_ok())
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        if pruned.len() != config.len() {
            info!(
                removed = config.len() - pruned.len(),
                "pruned mappings for fields no longer in use"
            );
        }
        Ok(pruned)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
