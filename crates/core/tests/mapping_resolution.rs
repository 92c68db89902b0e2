//! End-to-end tests for the mapping store and attribute resolver.
//!
//! These tests exercise the real `MappingStore` and `AttributeResolver` with:
//! - Real SQLite databases (in-memory and file-backed) as settings store,
//!   field catalog and user-meta writer
//! - An in-process directory that answers canned searches
//!
//! No network I/O.

use std::collections::HashMap;

use serde_json::json;

use ldapmeta_core::db::Database;
use ldapmeta_core::directory::{DirectoryClient, DirectoryEntry, DirectorySearchResult};
use ldapmeta_core::errors::{DirectoryError, ResolveError};
use ldapmeta_core::mapping::{FieldMapping, MappingStore, SettingsStore, EXCLUDED_META_KEYS};
use ldapmeta_core::resolver::{AttributeResolver, UserMetaWriter};

// ===========================================================================
// Helpers
// ===========================================================================

const BASE_DN: &str = "ou=people,dc=example,dc=com";
const ALT_DN: &str = "ou=alt,dc=example,dc=com";

#[derive(Default)]
struct CannedDirectory {
    results: HashMap<(String, String), DirectorySearchResult>,
    searches: Vec<(String, String)>,
}

impl DirectoryClient for CannedDirectory {
    fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<DirectorySearchResult, DirectoryError> {
        self.searches.push((base_dn.to_string(), filter.to_string()));
        Ok(self
            .results
            .get(&(base_dn.to_string(), filter.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// A database whose usermeta table knows a mix of mappable and reserved keys.
fn seeded_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.initialize().unwrap();
    for key in ["department", "phone", "employee_id"] {
        db.set_user_meta(1, key, "").unwrap();
    }
    for key in EXCLUDED_META_KEYS {
        db.set_user_meta(1, key, "x").unwrap();
    }
    db
}

fn base_result() -> DirectorySearchResult {
    DirectorySearchResult::new(vec![DirectoryEntry::new(format!("uid=jdoe,{BASE_DN}"))
        .with_attr("uid", ["jdoe"])
        .with_attr("mail", ["a@b.com"])
        .with_attr("employeeNumber", ["E-42"])])
}

// ===========================================================================
// Mapping store
// ===========================================================================

#[test]
fn excluded_keys_never_surface() {
    let db = seeded_db();
    db.update_option(
        "simpleldap_user_attr_map",
        &json!({
            "wp_capabilities": {"alt_dn": "", "ldap_attr": "memberof"},
            "department": {"alt_dn": "", "ldap_attr": "ou"},
        }),
    )
    .unwrap();

    let store = MappingStore::new(&db, &db);
    let names = store.load_field_names().unwrap();
    let config = store.load_mapping().unwrap();

    for excluded in EXCLUDED_META_KEYS {
        assert!(!names.iter().any(|n| n == *excluded));
        assert!(!config.contains_key(*excluded));
    }
    assert_eq!(names, vec!["department", "employee_id", "phone"]);
}

#[test]
fn fresh_state_has_empty_entry_per_field() {
    let db = seeded_db();
    let store = MappingStore::new(&db, &db);

    let config = store.load_mapping().unwrap();
    assert_eq!(config.len(), 3);
    for name in ["department", "employee_id", "phone"] {
        assert_eq!(config[name], FieldMapping::default());
    }
    assert!(db.get_option("simpleldap_user_attr_map").unwrap().is_none());
}

#[test]
fn submitted_form_survives_persist_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ldapmeta.db");
    let form = json!({
        "ldap_alt_dn_department": " OU=Alt,DC=Example,DC=Com ; UID ",
        "ldap_attr_department": "DepartmentNumber",
        "ldap_attr_phone": "  telephoneNumber",
        "ldap_attr_employee_id": ["not", "a", "string"],
    });

    {
        let db = Database::new(&path).unwrap();
        db.initialize().unwrap();
        db.set_user_meta(1, "department", "").unwrap();
        db.set_user_meta(1, "phone", "").unwrap();
        db.set_user_meta(1, "employee_id", "").unwrap();

        let store = MappingStore::new(&db, &db);
        let config = store.load_mapping().unwrap();
        let updated = store.apply_submitted_mapping(&config, &form).unwrap();
        store.persist(&updated).unwrap();
    }

    let db = Database::new(&path).unwrap();
    db.initialize().unwrap();
    let store = MappingStore::new(&db, &db);
    let reloaded = store.load_mapping().unwrap();

    assert_eq!(
        reloaded["department"],
        FieldMapping::new("ou=alt,dc=example,dc=com ; uid", "departmentnumber")
    );
    assert_eq!(reloaded["phone"], FieldMapping::new("", "telephonenumber"));
    assert_eq!(reloaded["employee_id"], FieldMapping::default());
}

// ===========================================================================
// Resolution
// ===========================================================================

#[test]
fn stored_mapping_resolves_and_writes_user_meta() {
    let db = seeded_db();
    let store = MappingStore::new(&db, &db);
    let config = store.load_mapping().unwrap();
    let config = store
        .apply_submitted_mapping(
            &config,
            &json!({
                "ldap_attr_phone": "mail",
                "ldap_alt_dn_department": format!("{ALT_DN};uid"),
                "ldap_attr_department": "departmentNumber",
                "ldap_attr_employee_id": "employeeNumber",
            }),
        )
        .unwrap();
    store.persist(&config).unwrap();

    let mut directory = CannedDirectory::default();
    directory.results.insert(
        (ALT_DN.to_string(), "uid=jdoe".to_string()),
        DirectorySearchResult::new(vec![
            DirectoryEntry::new(format!("uid=jdoe,{ALT_DN}")).with_attr("departmentNumber", ["R&D"])
        ]),
    );

    let config = store.load_mapping().unwrap();
    let data = AttributeResolver::new(&config)
        .resolve(Some(&mut directory), BASE_DN, &base_result())
        .unwrap();

    assert_eq!(
        directory.searches,
        vec![(ALT_DN.to_string(), "uid=jdoe".to_string())]
    );
    assert_eq!(data["department"], "R&D");
    assert_eq!(data["phone"], "a@b.com");
    assert_eq!(data["employee_id"], "E-42");

    db.write_user_meta(1, &data).unwrap();
    let meta = db.get_user_meta(1).unwrap();
    assert_eq!(meta["department"], "R&D");
    assert_eq!(meta["phone"], "a@b.com");
}

#[test]
fn malformed_alt_dn_aborts_resolution() {
    let db = seeded_db();
    let store = MappingStore::new(&db, &db);
    let config = store
        .apply_submitted_mapping(
            &store.load_mapping().unwrap(),
            &json!({"ldap_alt_dn_department": "badvalue", "ldap_attr_department": "ou"}),
        )
        .unwrap();

    let mut directory = CannedDirectory::default();
    let err = AttributeResolver::new(&config)
        .resolve(Some(&mut directory), BASE_DN, &base_result())
        .unwrap_err();

    assert!(matches!(err, ResolveError::MissingFilterAttribute { .. }));
    assert!(err.to_string().contains("department"));
    assert!(directory.searches.is_empty());
}
