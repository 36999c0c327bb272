//! Kind registry.
//!
//! Maps `(apiVersion, kind)` pairs to what the engine knows about them. Built
//! once at startup and passed to every component that dispatches on kind.

use std::collections::HashMap;

use dirsync_api::{Kind, API_VERSION, SECRET_API_VERSION};

/// What the engine knows about a registered kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindInfo {
    pub kind: Kind,
    /// Whether objects of this kind have a distinguished name and so may be
    /// used as a parent.
    pub produces_dn: bool,
}

#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<(String, String), KindInfo>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every kind dirsync manages.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for kind in [
            Kind::DirectoryRoot,
            Kind::OrganizationalUnit,
            Kind::Group,
            Kind::User,
        ] {
            registry.register(
                API_VERSION,
                KindInfo {
                    kind,
                    produces_dn: true,
                },
            );
        }
        registry.register(
            SECRET_API_VERSION,
            KindInfo {
                kind: Kind::Secret,
                produces_dn: false,
            },
        );
        registry
    }

    pub fn register(&mut self, api_version: &str, info: KindInfo) {
        self.kinds.insert(
            (api_version.to_string(), info.kind.as_str().to_string()),
            info,
        );
    }

    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<KindInfo> {
        self.kinds
            .get(&(api_version.to_string(), kind.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
