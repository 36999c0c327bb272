//! LDAPS client
//!
//! Implements [`DirectoryClient`] on top of `ldap3`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::client::{ApplyOutcome, DirectoryClient};
use crate::config::DirectoryConfig;
use crate::diff::{diff_entries, Modification};
use crate::dn;
use crate::entry::DirectoryEntry;
use crate::error::{DirectoryError, DirectoryResult, RC_INVALID_CREDENTIALS};

/// Filter matching every entry.
const ANY_OBJECT: &str = "(objectClass=*)";

/// Attribute list requesting no attributes at all.
const NO_ATTRIBUTES: &str = "1.1";

/// Client for one LDAPS directory.
pub struct LdapDirectoryClient {
    config: DirectoryConfig,

    tls: native_tls::TlsConnector,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectoryClient {
    /// Create a client. No connection is made until the first request.
    pub fn new(config: DirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;
        let tls = Self::tls_connector(&config)?;

        Ok(Self {
            config,
            tls,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    fn tls_connector(config: &DirectoryConfig) -> DirectoryResult<native_tls::TlsConnector> {
        let mut builder = native_tls::TlsConnector::builder();

        if let Some(pem) = &config.ca_certificate_pem {
            let certificate =
                native_tls::Certificate::from_pem(pem.as_bytes()).map_err(|e| DirectoryError::Tls {
                    message: format!("invalid CA certificate: {e}"),
                })?;
            builder.add_root_certificate(certificate);
        }

        if !config.verify_certificates {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        builder.build().map_err(|e| DirectoryError::Tls {
            message: e.to_string(),
        })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.connection.request_timeout_secs)
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> DirectoryResult<Ldap> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;
        // Another task may have connected while we waited for the lock.
        if let Some(ref conn) = *conn_guard {
            return Ok(conn.clone());
        }

        let conn = self.create_connection().await?;
        *conn_guard = Some(conn.clone());
        Ok(conn)
    }

    /// Create a new LDAP connection and bind.
    async fn create_connection(&self) -> DirectoryResult<Ldap> {
        let url = &self.config.url;
        debug!(url = %url, "Connecting to directory");

        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(
                self.config.connection.connection_timeout_secs,
            ))
            .set_connector(self.tls.clone());
        if !self.config.verify_certificates {
            settings = settings.set_no_tls_verify(true);
        }

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("failed to connect to directory at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = tokio::time::timeout(
            self.request_timeout(),
            ldap.simple_bind(bind_dn, &self.config.bind_password),
        )
        .await
        .map_err(|_| DirectoryError::Timeout {
            timeout_secs: self.config.connection.request_timeout_secs,
        })?
        .map_err(|e| {
            DirectoryError::connection_failed_with_source(format!("LDAP bind failed for {bind_dn}"), e)
        })?;

        if result.rc == RC_INVALID_CREDENTIALS {
            return Err(DirectoryError::AuthenticationFailed {
                bind_dn: bind_dn.clone(),
            });
        }
        if result.rc != 0 {
            return Err(DirectoryError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(url = %url, "Directory connection established");
        Ok(ldap)
    }

    /// Forget the cached connection so the next request reconnects.
    async fn reset_connection(&self) {
        if self.connection.write().await.take().is_some() {
            debug!("Dropped cached directory connection");
        }
    }

    /// Run one request with the configured timeout.
    ///
    /// Transport failures and timeouts drop the cached connection.
    async fn timed<T>(
        &self,
        operation: &str,
        request: impl Future<Output = Result<T, LdapError>>,
    ) -> DirectoryResult<T> {
        match tokio::time::timeout(self.request_timeout(), request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.reset_connection().await;
                Err(DirectoryError::connection_failed_with_source(
                    format!("LDAP {operation} failed"),
                    e,
                ))
            }
            Err(_) => {
                self.reset_connection().await;
                Err(DirectoryError::Timeout {
                    timeout_secs: self.config.connection.request_timeout_secs,
                })
            }
        }
    }

    fn check(result: &LdapResult, dn: &str) -> DirectoryResult<()> {
        if result.rc == 0 {
            Ok(())
        } else {
            Err(DirectoryError::from_result_code(result.rc, &result.text, dn))
        }
    }

    fn entry_from_search(entry: SearchEntry) -> DirectoryEntry {
        let mut result = DirectoryEntry::new(entry.dn);
        for (name, values) in entry.attrs {
            result.set(&name, values);
        }
        result
    }

    fn to_ldap_attributes(entry: &DirectoryEntry) -> Vec<(String, HashSet<String>)> {
        entry
            .attributes()
            .map(|(name, values)| (name.to_string(), values.iter().cloned().collect()))
            .collect()
    }

    fn to_ldap_mods(modifications: &[Modification]) -> Vec<Mod<String>> {
        modifications
            .iter()
            .map(|modification| match modification {
                Modification::Add { attribute, values } => {
                    Mod::Add(attribute.clone(), values.iter().cloned().collect())
                }
                Modification::Replace { attribute, values } => {
                    Mod::Replace(attribute.clone(), values.iter().cloned().collect())
                }
                Modification::Delete { attribute } => Mod::Delete(attribute.clone(), HashSet::new()),
            })
            .collect()
    }

    async fn add_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        let attributes = Self::to_ldap_attributes(entry);

        let result = self.timed("add", ldap.add(&entry.dn, attributes)).await?;
        Self::check(&result, &entry.dn)
    }

    async fn delete_one(&self, dn: &str) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        let result = self.timed("delete", ldap.delete(dn)).await?;
        Self::check(&result, dn)
    }

    /// Close the connection, if one is open.
    pub async fn dispose(&self) {
        let mut conn_guard = self.connection.write().await;
        if let Some(mut ldap) = conn_guard.take() {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "Error during LDAP unbind");
            }
        }
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectoryClient {
    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn ping(&self) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        let base_dn = &self.config.base_dn;

        let result = self
            .timed(
                "search",
                ldap.search(base_dn, Scope::Base, ANY_OBJECT, vec![NO_ATTRIBUTES]),
            )
            .await?;
        Self::check(&result.1, base_dn)?;

        if result.0.is_empty() {
            return Err(DirectoryError::NotFound {
                dn: base_dn.clone(),
            });
        }

        debug!("Directory reachable");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_entry(&self, dn: &str) -> DirectoryResult<DirectoryEntry> {
        let mut ldap = self.get_connection().await?;

        let result = self
            .timed("search", ldap.search(dn, Scope::Base, ANY_OBJECT, vec!["*"]))
            .await?;
        Self::check(&result.1, dn)?;

        result
            .0
            .into_iter()
            .next()
            .map(|raw| Self::entry_from_search(SearchEntry::construct(raw)))
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.to_string() })
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn))]
    async fn create_or_update_entry(&self, entry: &DirectoryEntry) -> DirectoryResult<ApplyOutcome> {
        if entry.is_empty() {
            return Err(DirectoryError::InvalidEntry {
                dn: entry.dn.clone(),
                message: "entry has no attributes".to_string(),
            });
        }

        let existing = match self.get_entry(&entry.dn).await {
            Ok(existing) => existing,
            Err(DirectoryError::NotFound { .. }) => {
                debug!("Creating directory entry");
                self.add_entry(entry).await?;
                info!("Directory entry created");
                return Ok(ApplyOutcome::Created);
            }
            Err(e) => return Err(e),
        };

        let modifications = diff_entries(&existing, entry)?;
        if modifications.is_empty() {
            debug!("Directory entry up to date");
            return Ok(ApplyOutcome::Unchanged);
        }

        debug!(
            attributes = ?modifications.iter().map(Modification::attribute).collect::<Vec<_>>(),
            "Modifying directory entry"
        );

        let mut ldap = self.get_connection().await?;
        let result = self
            .timed("modify", ldap.modify(&entry.dn, Self::to_ldap_mods(&modifications)))
            .await?;
        Self::check(&result, &entry.dn)?;

        info!("Directory entry updated");
        Ok(ApplyOutcome::Updated)
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, dn: &str, recursive: bool) -> DirectoryResult<()> {
        if !recursive {
            self.delete_one(dn).await?;
            info!("Directory entry deleted");
            return Ok(());
        }

        let mut ldap = self.get_connection().await?;
        let result = self
            .timed(
                "search",
                ldap.search(dn, Scope::Subtree, ANY_OBJECT, vec![NO_ATTRIBUTES]),
            )
            .await?;
        Self::check(&result.1, dn)?;

        let mut subtree: Vec<String> = result
            .0
            .into_iter()
            .map(|raw| SearchEntry::construct(raw).dn)
            .collect();
        if subtree.is_empty() {
            return Err(DirectoryError::NotFound { dn: dn.to_string() });
        }
        subtree.sort_by_key(|entry_dn| std::cmp::Reverse(dn::depth(entry_dn)));

        for entry_dn in &subtree {
            match self.delete_one(entry_dn).await {
                Ok(()) => debug!(entry = %entry_dn, "Deleted subtree entry"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        info!(removed = subtree.len(), "Directory subtree deleted");
        Ok(())
    }
}

impl std::fmt::Debug for LdapDirectoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectoryClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
