//! Attribute resolution: turn a mapping configuration plus directory search
//! results into user-meta values.
//!
//! Per mapped field the resolver either reads the attribute straight from the
//! base search result, or (when the field has an alternate DN) takes the
//! filter attribute's value from the base result and runs a secondary search
//! under the alternate DN.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::directory::{DirectoryClient, DirectorySearchResult};
use crate::errors::{DatabaseError, ResolveError};
use crate::mapping::{AltDn, FieldMapping, MappingConfiguration};

/// Resolved values keyed by user-meta field name.
///
/// A field with no resolved value has no key.
pub type ResolvedUserData = BTreeMap<String, String>;

/// Destination for resolved values, typically the user-profile store.
pub trait UserMetaWriter {
    /// Store `data` as `user_id`'s metadata. Returns the number of fields
    /// written.
    fn write_user_meta(&self, user_id: i64, data: &ResolvedUserData)
        -> Result<usize, DatabaseError>;
}

/// Runs one resolution pass over a mapping configuration.
pub struct AttributeResolver<'a> {
    mappings: &'a MappingConfiguration,
}

impl<'a> AttributeResolver<'a> {
    pub fn new(mappings: &'a MappingConfiguration) -> Self {
        Self { mappings }
    }

    /// Resolve every mapped field into a fresh [`ResolvedUserData`].
    ///
    /// Values resolved before an error are discarded with it; use
    /// [`resolve_into`](Self::resolve_into) to keep them.
    pub fn resolve(
        &self,
        client: Option<&mut dyn DirectoryClient>,
        base_dn: &str,
        base_result: &DirectorySearchResult,
    ) -> Result<ResolvedUserData, ResolveError> {
        let mut data = ResolvedUserData::new();
        self.resolve_into(client, base_dn, base_result, &mut data)?;
        Ok(data)
    }

    /// Resolve every mapped field, writing values into `out`.
    ///
    /// Fields are visited in name order. The first fatal error aborts the
    /// pass; values already written to `out` stay there. With no client the
    /// pass is skipped and `out` is left untouched.
    pub fn resolve_into(
        &self,
        client: Option<&mut dyn DirectoryClient>,
        base_dn: &str,
        base_result: &DirectorySearchResult,
        out: &mut ResolvedUserData,
    ) -> Result<(), ResolveError> {
        let Some(client) = client else {
            debug!("no directory client available, skipping attribute resolution");
            return Ok(());
        };

        let before = out.len();
        for (field, mapping) in self.mappings {
            if let Some(value) = resolve_field(client, field, mapping, base_dn, base_result)? {
                debug!(field = %field, value = %value, "resolved field");
                out.insert(field.clone(), value);
            }
        }

        info!(
            base_dn,
            resolved = out.len() - before,
            mapped = self.mappings.values().filter(|m| m.is_mapped()).count(),
            "attribute resolution complete"
        );
        Ok(())
    }
}

/// Resolve a single field. `Ok(None)` means nothing to contribute.
fn resolve_field(
    client: &mut dyn DirectoryClient,
    field: &str,
    mapping: &FieldMapping,
    base_dn: &str,
    base_result: &DirectorySearchResult,
) -> Result<Option<String>, ResolveError> {
    let ldap_attr = mapping.ldap_attr.trim();
    if ldap_attr.is_empty() {
        return Ok(None);
    }

    let alt = AltDn::parse(&mapping.alt_dn).map_err(|e| ResolveError::MissingFilterAttribute {
        field: field.to_string(),
        alt_dn: e.0,
    })?;

    let Some(alt) = alt else {
        let value = base_result.first_value(ldap_attr).map(str::to_string);
        if value.is_none() {
            debug!(field, ldap_attr, base_dn, "attribute not present in base result");
        }
        return Ok(value);
    };

    let Some(filter_value) = base_result.first_value(&alt.filter_attr) else {
        return Err(ResolveError::FilterValueNotFound {
            field: field.to_string(),
            filter_attr: alt.filter_attr,
            dn: alt.dn,
        });
    };

    let filter = alt.filter_for(filter_value);
    debug!(field, dn = %alt.dn, filter = %filter, "secondary directory search");
    let result = client
        .search(&alt.dn, &filter)
        .map_err(|source| ResolveError::Directory {
            field: field.to_string(),
            source,
        })?;

    let value = result.first_value(ldap_attr).map(str::to_string);
    if value.is_none() {
        warn!(field, ldap_attr, dn = %alt.dn, filter = %filter, "attribute not found via alternate DN");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::directory::DirectoryEntry;
    use crate::errors::DirectoryError;

    /// Directory fake answering from canned results and recording searches.
    #[derive(Default)]
    struct FakeDirectory {
        results: HashMap<(String, String), DirectorySearchResult>,
        searches: Vec<(String, String)>,
        fail: bool,
    }

    impl FakeDirectory {
        fn with_result(mut self, dn: &str, filter: &str, entry: DirectoryEntry) -> Self {
            self.results
                .insert((dn.into(), filter.into()), DirectorySearchResult::new(vec![entry]));
            self
        }
    }

    impl DirectoryClient for FakeDirectory {
        fn search(
            &mut self,
            base_dn: &str,
            filter: &str,
        ) -> Result<DirectorySearchResult, DirectoryError> {
            self.searches.push((base_dn.into(), filter.into()));
            if self.fail {
                return Err(DirectoryError::SearchFailed {
                    base_dn: base_dn.into(),
                    filter: filter.into(),
                    detail: "server down".into(),
                });
            }
            Ok(self
                .results
                .get(&(base_dn.to_string(), filter.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    const BASE_DN: &str = "ou=people,dc=example,dc=com";

    fn base_result() -> DirectorySearchResult {
        DirectorySearchResult::new(vec![DirectoryEntry::new("uid=jdoe,ou=people,dc=example,dc=com")
            .with_attr("uid", ["jdoe"])
            .with_attr("mail", ["a@b.com"])
            .with_attr("employeeNumber", ["1234"])])
    }

    fn mappings(entries: &[(&str, &str, &str)]) -> MappingConfiguration {
        entries
            .iter()
            .map(|(field, alt_dn, attr)| (field.to_string(), FieldMapping::new(*alt_dn, *attr)))
            .collect()
    }

    #[test]
    fn test_base_dn_lookup() {
        let config = mappings(&[("theField", "", "mail")]);
        let mut dir = FakeDirectory::default();

        let data = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap();

        assert_eq!(data.get("theField").map(String::as_str), Some("a@b.com"));
        assert!(dir.searches.is_empty());
    }

    #[test]
    fn test_unmapped_field_is_skipped() {
        let config = mappings(&[("theField", "ou=alt;uid", "  "), ("mail", "", "mail")]);
        let mut dir = FakeDirectory::default();

        let data = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap();

        assert!(!data.contains_key("theField"));
        assert_eq!(data.len(), 1);
        assert!(dir.searches.is_empty());
    }

    #[test]
    fn test_missing_base_attribute_contributes_nothing() {
        let config = mappings(&[("phone", "", "telephonenumber")]);
        let mut dir = FakeDirectory::default();

        let data = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_alternate_dn_lookup() {
        let config = mappings(&[("department", "ou=alt,dc=example,dc=com;uid", "departmentnumber")]);
        let mut dir = FakeDirectory::default().with_result(
            "ou=alt,dc=example,dc=com",
            "uid=jdoe",
            DirectoryEntry::new("uid=jdoe,ou=alt,dc=example,dc=com")
                .with_attr("departmentNumber", ["R&D"]),
        );

        let data = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap();

        assert_eq!(
            dir.searches,
            vec![("ou=alt,dc=example,dc=com".to_string(), "uid=jdoe".to_string())]
        );
        assert_eq!(data["department"], "R&D");
    }

    #[test]
    fn test_alternate_dn_without_match_contributes_nothing() {
        let config = mappings(&[("department", "ou=alt;employeenumber", "ou")]);
        let mut dir = FakeDirectory::default();

        let data = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap();

        assert_eq!(dir.searches, vec![("ou=alt".to_string(), "employeenumber=1234".to_string())]);
        assert!(data.is_empty());
    }

    #[test]
    fn test_alt_dn_without_filter_is_configuration_error() {
        let config = mappings(&[("department", "badvalue", "ou")]);
        let mut dir = FakeDirectory::default();

        let err = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::MissingFilterAttribute { ref field, ref alt_dn }
                if field == "department" && alt_dn == "badvalue"
        ));
        assert!(dir.searches.is_empty());
    }

    #[test]
    fn test_missing_filter_value_is_fatal() {
        let config = mappings(&[("manager", "ou=alt;manageruid", "cn")]);
        let mut dir = FakeDirectory::default();

        let err = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::FilterValueNotFound { ref filter_attr, ref dn, .. }
                if filter_attr == "manageruid" && dn == "ou=alt"
        ));
        assert_eq!(err.field(), "manager");
    }

    #[test]
    fn test_error_keeps_earlier_values() {
        // "a_mail" sorts before "b_broken", so it is written before the abort.
        let config = mappings(&[("a_mail", "", "mail"), ("b_broken", "x;y;z", "cn"), ("c_uid", "", "uid")]);
        let mut dir = FakeDirectory::default();
        let mut out = ResolvedUserData::new();

        let result = AttributeResolver::new(&config).resolve_into(
            Some(&mut dir),
            BASE_DN,
            &base_result(),
            &mut out,
        );

        assert!(result.is_err());
        assert_eq!(out.get("a_mail").map(String::as_str), Some("a@b.com"));
        assert!(!out.contains_key("c_uid"));
    }

    #[test]
    fn test_directory_failure_names_field() {
        let config = mappings(&[("department", "ou=alt;uid", "ou")]);
        let mut dir = FakeDirectory {
            fail: true,
            ..Default::default()
        };

        let err = AttributeResolver::new(&config)
            .resolve(Some(&mut dir), BASE_DN, &base_result())
            .unwrap_err();
        assert!(matches!(err, ResolveError::Directory { ref field, .. } if field == "department"));
    }

    #[test]
    fn test_no_client_skips_pass() {
        let config = mappings(&[("department", "badvalue", "ou"), ("mail", "", "mail")]);
        let mut out = ResolvedUserData::new();
        out.insert("existing".into(), "kept".into());

        AttributeResolver::new(&config)
            .resolve_into(None, BASE_DN, &base_result(), &mut out)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out["existing"], "kept");
    }
}
