//! `ldap3`-backed directory client.
//!
//! Uses the synchronous [`LdapConn`] API: every search is a single blocking
//! call. Connection lifetime (connect, bind, unbind) is owned by the caller
//! of [`LdapDirectory::connect`] / [`LdapDirectory::close`].

use std::time::Duration;

use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, info, warn};

use super::{DirectoryClient, DirectoryEntry, DirectorySearchResult};
use crate::config::DirectoryConfig;
use crate::errors::DirectoryError;

/// LDAP result code for a search base that does not exist.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// A bound connection to an LDAP server.
pub struct LdapDirectory {
    url: String,
    base_dn: String,
    user_filter: String,
    conn: LdapConn,
}

impl LdapDirectory {
    /// Connect to the configured server and bind.
    ///
    /// Binds anonymously when no bind DN is configured.
    pub fn connect(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        let settings =
            LdapConnSettings::new().set_conn_timeout(Duration::from_secs(config.timeout_secs));

        debug!(url = %config.url, "connecting to LDAP server");
        let mut conn = LdapConn::with_settings(settings, &config.url).map_err(|e| {
            DirectoryError::ConnectFailed {
                url: config.url.clone(),
                detail: e.to_string(),
            }
        })?;

        if let Some(ref bind_dn) = config.bind_dn {
            let password = config.bind_password.as_deref().unwrap_or("");
            conn.simple_bind(bind_dn, password)
                .and_then(|res| res.success())
                .map_err(|e| DirectoryError::BindFailed {
                    bind_dn: bind_dn.clone(),
                    detail: e.to_string(),
                })?;
            debug!(bind_dn = %bind_dn, "bound to LDAP server");
        }

        info!(url = %config.url, base_dn = %config.base_dn, "connected to LDAP directory");
        Ok(Self {
            url: config.url.clone(),
            base_dn: config.base_dn.clone(),
            user_filter: config.user_filter.clone(),
            conn,
        })
    }

    /// Base DN used for user searches.
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Run the base search for `username` under the configured base DN.
    pub fn find_user(&mut self, username: &str) -> Result<DirectorySearchResult, DirectoryError> {
        let filter = user_filter_for(&self.user_filter, username);
        let base_dn = self.base_dn.clone();
        let result = self.search(&base_dn, &filter)?;
        if result.is_empty() {
            warn!(username, base_dn = %base_dn, "no directory entry found for user");
        }
        Ok(result)
    }

    /// Unbind and drop the connection.
    pub fn close(mut self) -> Result<(), DirectoryError> {
        debug!(url = %self.url, "unbinding from LDAP server");
        self.conn.unbind()?;
        Ok(())
    }
}

impl DirectoryClient for LdapDirectory {
    fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<DirectorySearchResult, DirectoryError> {
        let filter = normalize_filter(filter);
        debug!(base_dn, filter = %filter, "LDAP search");

        let search_failed = |detail: String| DirectoryError::SearchFailed {
            base_dn: base_dn.to_string(),
            filter: filter.clone(),
            detail,
        };

        let result = self
            .conn
            .search(base_dn, Scope::Subtree, &filter, vec!["*"])
            .map_err(|e| search_failed(e.to_string()))?;

        if result.1.rc == RC_NO_SUCH_OBJECT {
            debug!(base_dn, "search base does not exist, treating as no entries");
            return Ok(DirectorySearchResult::default());
        }

        let (entries, _res) = result.success().map_err(|e| search_failed(e.to_string()))?;
        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(DirectoryEntry::from)
            .collect();

        debug!(base_dn, count = entries.len(), "LDAP search complete");
        Ok(DirectorySearchResult::new(entries))
    }
}

/// Substitute `{username}` in the user filter, escaping the value.
pub fn user_filter_for(template: &str, username: &str) -> String {
    template.replace("{username}", &ldap3::ldap_escape(username))
}

/// Wrap a bare `attr=value` filter in parentheses.
pub fn normalize_filter(filter: &str) -> String {
    let filter = filter.trim();
    if filter.starts_with('(') {
        filter.to_string()
    } else {
        format!("({filter})")
    }
}
