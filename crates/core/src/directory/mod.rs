//! Directory service access.
//!
//! The resolver only needs one capability from the directory: run a search
//! under a base DN with a filter. [`DirectoryClient`] captures that, with
//! [`LdapDirectory`] as the `ldap3`-backed implementation.

pub mod ldap;

use std::collections::HashMap;

use crate::errors::DirectoryError;

pub use ldap::LdapDirectory;

/// Search capability of a bound directory connection.
pub trait DirectoryClient {
    /// Search the subtree under `base_dn` with `filter`.
    fn search(&mut self, base_dn: &str, filter: &str)
        -> Result<DirectorySearchResult, DirectoryError>;
}

/// A single directory entry with its string attributes.
///
/// Attribute names are stored lower-cased, so lookups are
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert_attr(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn insert_attr(&mut self, name: &str, values: Vec<String>) {
        self.attrs.insert(name.to_lowercase(), values);
    }

    /// All values of `name`, if the attribute is present.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attrs.get(&name.to_lowercase()).map(Vec::as_slice)
    }

    /// First value of `name`.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

impl From<ldap3::SearchEntry> for DirectoryEntry {
    fn from(entry: ldap3::SearchEntry) -> Self {
        let mut converted = DirectoryEntry::new(entry.dn);
        for (name, values) in entry.attrs {
            converted.insert_attr(&name, values);
        }
        converted
    }
}

/// Entries returned by one directory search, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySearchResult {
    pub entries: Vec<DirectoryEntry>,
}

impl DirectorySearchResult {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_entry(&self) -> Option<&DirectoryEntry> {
        self.entries.first()
    }

    /// First value of `attr` on the first entry, if any.
    pub fn first_value(&self, attr: &str) -> Option<&str> {
        self.first_entry().and_then(|entry| entry.first_value(attr))
    }
}

impl From<Vec<DirectoryEntry>> for DirectorySearchResult {
    fn from(entries: Vec<DirectoryEntry>) -> Self {
        Self::new(entries)
    }
}
