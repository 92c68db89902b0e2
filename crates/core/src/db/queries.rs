//! Typed query helpers for the `options` and `usermeta` tables, and the
//! store traits the mapping and resolver layers consume.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::mapping::{FieldCatalog, SettingsStore};
use crate::resolver::{ResolvedUserData, UserMetaWriter};

impl Database {
    // -- options ------------------------------------------------------------

    /// Read a raw option value.
    pub fn get_option_raw(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM options WHERE name = ?1")?;
        let mut rows = stmt.query_map(params![name], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(Ok(val)) => Ok(Some(val)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Set a raw option value (upsert).
    pub fn set_option_raw(&self, name: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO options (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![name, value, now],
        )?;
        debug!(name, "set option");
        Ok(())
    }

    // -- usermeta -----------------------------------------------------------

    /// Set one metadata value for a user (upsert).
    pub fn set_user_meta(
        &self,
        user_id: i64,
        meta_key: &str,
        meta_value: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        upsert_user_meta(&conn, user_id, meta_key, meta_value, &now)
    }

    /// All metadata for a user, keyed by meta key.
    pub fn get_user_meta(&self, user_id: i64) -> Result<BTreeMap<String, String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT meta_key, meta_value FROM usermeta WHERE user_id = ?1 ORDER BY meta_key",
        )?;
        let meta = stmt
            .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>, _>>()?;
        Ok(meta)
    }
}

fn upsert_user_meta(
    conn: &rusqlite::Connection,
    user_id: i64,
    meta_key: &str,
    meta_value: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO usermeta (user_id, meta_key, meta_value, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, meta_key) DO UPDATE
         SET meta_value = excluded.meta_value, updated_at = excluded.updated_at",
        params![user_id, meta_key, meta_value, now],
    )?;
    Ok(())
}

impl SettingsStore for Database {
    fn get_option(&self, key: &str) -> Result<Option<Value>, DatabaseError> {
        match self.get_option_raw(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DatabaseError::InvalidValue {
                    key: key.to_string(),
                    detail: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    fn update_option(&self, key: &str, value: &Value) -> Result<(), DatabaseError> {
        self.set_option_raw(key, &value.to_string())
    }
}

impl FieldCatalog for Database {
    fn list_distinct_meta_keys(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT meta_key FROM usermeta ORDER BY meta_key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

impl UserMetaWriter for Database {
    fn write_user_meta(
        &self,
        user_id: i64,
        data: &ResolvedUserData,
    ) -> Result<usize, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let written = self.transaction(|conn| {
            for (key, value) in data {
                upsert_user_meta(conn, user_id, key, value, &now)?;
            }
            Ok(data.len())
        })?;
        debug!(user_id, written, "wrote resolved user meta");
        Ok(written)
    }
}
