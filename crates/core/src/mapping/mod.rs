//! Field mapping configuration: which LDAP attribute populates which
//! user-meta field, and where to look it up.
//!
//! Each mappable field carries two settings:
//! 1. `ldap_attr` -- the attribute to read (empty: field is not mapped)
//! 2. `alt_dn` -- `dn;filter_attribute` for a secondary search (empty: read
//!    from the base search result)

pub mod alt_dn;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use alt_dn::AltDn;
pub use store::{FieldCatalog, MappingStore, SettingsStore};

/// Settings-store key under which the mapping configuration is persisted.
pub const DEFAULT_OPTION_KEY: &str = "simpleldap_user_attr_map";

/// Form field prefix for a field's alternate DN.
pub const ALT_DN_PREFIX: &str = "ldap_alt_dn_";

/// Form field prefix for a field's LDAP attribute name.
pub const LDAP_ATTR_PREFIX: &str = "ldap_attr_";

/// System-reserved user-meta keys that are never mapped.
pub const EXCLUDED_META_KEYS: &[&str] = &[
    "admin_color",
    "comment_shortcuts",
    "dismissed_wp_pointers",
    "rich_editing",
    "show_admin_bar_front",
    "show_welcome_panel",
    "use_ssl",
    "wp_capabilities",
    "wp_dashboard_quick_press_last_post_id",
    "wp_user-settings",
    "wp_user-settings-time",
    "wp_user_level",
    "first_name",
    "last_name",
    "description",
    "nickname",
];

/// Whether `meta_key` is on the denylist.
pub fn is_excluded(meta_key: &str) -> bool {
    EXCLUDED_META_KEYS.contains(&meta_key)
}

/// Mapping configuration keyed by user-meta field name.
///
/// A `BTreeMap` so that resolution visits fields in a stable order.
pub type MappingConfiguration = BTreeMap<String, FieldMapping>;

/// LDAP mapping for a single user-meta field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Alternate search base and filter attribute, encoded as `dn;filter`.
    #[serde(default, alias = "altDN")]
    pub alt_dn: String,

    /// Directory attribute holding this field's value.
    #[serde(default, alias = "ldapAttr")]
    pub ldap_attr: String,
}

impl FieldMapping {
    pub fn new(alt_dn: impl Into<String>, ldap_attr: impl Into<String>) -> Self {
        Self {
            alt_dn: alt_dn.into(),
            ldap_attr: ldap_attr.into(),
        }
    }

    /// Whether an LDAP attribute is configured for this field.
    pub fn is_mapped(&self) -> bool {
        !self.ldap_attr.trim().is_empty()
    }

    /// Decode a stored entry leniently: non-string members become empty.
    pub(crate) fn from_stored(value: &Value) -> Self {
        let member = |names: &[&str]| -> String {
            names
                .iter()
                .find_map(|name| value.get(*name).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string()
        };
        Self {
            alt_dn: member(&["alt_dn", "altDN"]),
            ldap_attr: member(&["ldap_attr", "ldapAttr"]),
        }
    }
}

/// Option key and form prefixes used by [`MappingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOptions {
    pub option_key: String,
    pub alt_dn_prefix: String,
    pub ldap_attr_prefix: String,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            option_key: DEFAULT_OPTION_KEY.into(),
            alt_dn_prefix: ALT_DN_PREFIX.into(),
            ldap_attr_prefix: LDAP_ATTR_PREFIX.into(),
        }
    }
}
