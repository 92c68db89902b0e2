//! Decoding of the `dn;filter_attribute` alternate DN setting.

use std::fmt;

use crate::errors::InvalidAltDn;

/// Alternate search base plus the attribute correlating it with the base
/// search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltDn {
    pub dn: String,
    pub filter_attr: String,
}

impl AltDn {
    /// Decode a stored alternate DN.
    ///
    /// Returns `Ok(None)` for an empty (or blank) value. Otherwise the value
    /// must split on `;` into exactly two tokens, both non-empty after
    /// trimming.
    pub fn parse(raw: &str) -> Result<Option<Self>, InvalidAltDn> {
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let tokens: Vec<&str> = raw.split(';').map(str::trim).collect();
        match tokens.as_slice() {
            [dn, filter_attr] if !dn.is_empty() && !filter_attr.is_empty() => Ok(Some(Self {
                dn: (*dn).to_string(),
                filter_attr: (*filter_attr).to_string(),
            })),
            _ => Err(InvalidAltDn(raw.to_string())),
        }
    }

    /// Search filter matching `value` on the filter attribute.
    ///
    /// The value is escaped so it cannot alter the filter's structure.
    pub fn filter_for(&self, value: &str) -> String {
        format!("{}={}", self.filter_attr, ldap3::ldap_escape(value))
    }
}

impl fmt::Display for AltDn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.dn, self.filter_attr)
    }
}
