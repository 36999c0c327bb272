//! Directory clients per directory root.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use dirsync_api::{DirectoryRoot, ObjectKey, Resource, Secret};
use dirsync_directory::{DirectoryClient, DirectoryConfig, LdapDirectoryClient};

use crate::config::EngineConfig;
use crate::dn::root_suffix;
use crate::error::{EngineError, EngineResult};
use crate::store::ObjectStore;

/// Key of the admin password inside the admin secret.
pub const ADMIN_PASSWORD_KEY: &str = "password";

/// Key of the CA bundle inside the certificate secret.
pub const CA_CERTIFICATE_KEY: &str = "ca.crt";

/// Name of the secret holding a root's admin password.
pub fn admin_secret_name(root: &str) -> String {
    format!("dirsync-{root}-admin-password")
}

/// Address of a root's directory server.
pub fn directory_url(root: &DirectoryRoot) -> String {
    match &root.spec.address_override {
        Some(address) if !address.trim().is_empty() => address.trim().to_string(),
        _ => format!(
            "ldaps://dirsync-{}.{}.svc:636",
            root.metadata.name, root.metadata.namespace
        ),
    }
}

/// Hands out the client for a directory root.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client_for(&self, root: &DirectoryRoot) -> EngineResult<Arc<dyn DirectoryClient>>;

    /// Forget the client of a root that is going away.
    async fn release(&self, _root: &ObjectKey) {}
}

struct CachedClient {
    config: DirectoryConfig,
    client: Arc<LdapDirectoryClient>,
}

/// Builds one LDAPS client per root from the root's secrets.
///
/// Clients are cached and rebuilt when the derived connection settings
/// change, for example after the admin password secret was rotated.
pub struct LdapClientProvider {
    store: Arc<dyn ObjectStore>,
    config: EngineConfig,
    clients: RwLock<HashMap<ObjectKey, CachedClient>>,
}

impl LdapClientProvider {
    pub fn new(store: Arc<dyn ObjectStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Connection settings for `root`.
    pub async fn directory_config(&self, root: &DirectoryRoot) -> EngineResult<DirectoryConfig> {
        let namespace = &root.metadata.namespace;
        let suffix = root_suffix(root)?;

        let admin_name = admin_secret_name(&root.metadata.name);
        let admin: Option<Secret> = self.store.get_as(namespace, &admin_name).await?;
        let password = admin
            .as_ref()
            .and_then(|secret| secret.get(ADMIN_PASSWORD_KEY))
            .ok_or_else(|| {
                EngineError::NotReady(format!("admin password secret '{admin_name}' not found"))
            })?;

        let certificate_name = &root.spec.certificate_secret_ref.name;
        let certificate: Option<Secret> = self.store.get_as(namespace, certificate_name).await?;
        let certificate = certificate.ok_or_else(|| {
            EngineError::NotReady(format!("certificate secret '{certificate_name}' not found"))
        })?;

        let mut config = DirectoryConfig::new(
            directory_url(root),
            suffix.clone(),
            format!("cn=admin,{suffix}"),
            password,
        )
        .with_verify_certificates(self.config.verify_certificates)
        .with_connection(self.config.connection_settings());
        if let Some(pem) = certificate.get(CA_CERTIFICATE_KEY) {
            config = config.with_ca_certificate(pem);
        }

        Ok(config)
    }
}

#[async_trait]
impl ClientProvider for LdapClientProvider {
    async fn client_for(&self, root: &DirectoryRoot) -> EngineResult<Arc<dyn DirectoryClient>> {
        let key = root.key();
        let config = self.directory_config(root).await?;

        {
            let clients = self.clients.read().await;
            if let Some(cached) = clients.get(&key) {
                if cached.config == config {
                    return Ok(cached.client.clone());
                }
            }
        }

        let mut clients = self.clients.write().await;
        if let Some(cached) = clients.get(&key) {
            if cached.config == config {
                return Ok(cached.client.clone());
            }
        }

        let client = Arc::new(LdapDirectoryClient::new(config.clone())?);
        info!(root = %key, url = %config.url, "Built directory client");
        // A replaced client may still serve in-flight reconciles; its session
        // closes once the last handle goes.
        if clients
            .insert(
                key,
                CachedClient {
                    config,
                    client: client.clone(),
                },
            )
            .is_some()
        {
            debug!("Replaced outdated directory client");
        }

        Ok(client)
    }

    async fn release(&self, root: &ObjectKey) {
        let removed = self.clients.write().await.remove(root);
        if let Some(cached) = removed {
            debug!(root = %root, "Releasing directory client");
            cached.client.dispose().await;
        }
    }
}

/// Fixed clients, for tests and embedders that manage connections themselves.
#[derive(Default)]
pub struct StaticClientProvider {
    default: Option<Arc<dyn DirectoryClient>>,
    clients: HashMap<ObjectKey, Arc<dyn DirectoryClient>>,
}

impl StaticClientProvider {
    /// Provider answering every root with `client`.
    pub fn new(client: Arc<dyn DirectoryClient>) -> Self {
        Self {
            default: Some(client),
            clients: HashMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, root: ObjectKey, client: Arc<dyn DirectoryClient>) -> Self {
        self.clients.insert(root, client);
        self
    }
}

#[async_trait]
impl ClientProvider for StaticClientProvider {
    async fn client_for(&self, root: &DirectoryRoot) -> EngineResult<Arc<dyn DirectoryClient>> {
        let key = root.key();
        self.clients
            .get(&key)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| EngineError::NotReady(format!("no directory client for {key}")))
    }
}
