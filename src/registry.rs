// SPDX-License-Identifier: AGPL-3.0-or-later

//! Service registry snapshot and per-environment flag resolution.
//!
//! The registry describes every known service/version and the capabilities it
//! requires from the gateway. The table is loaded once at process start and
//! replaced wholesale by an out-of-band reload; in-flight requests hold on to
//! whichever snapshot they took at entry and never observe a partial swap.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Per-service, per-environment capability declaration.
///
/// Only `requires_external_key` and `oauth_enabled` may be overridden per
/// environment; every other flag is environment-invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistryEntry {
    /// Attach the authenticated user to the trust context.
    #[serde(default)]
    pub requires_user_profile: bool,
    /// Carry the full user profile inside `user_access`.
    #[serde(default)]
    pub requires_profile_details: bool,
    /// Carry the user's ACL inside `user_access`.
    #[serde(default)]
    pub requires_acl_details: bool,
    /// Carry application and package ACLs in the trust context.
    #[serde(default)]
    pub requires_package_acl: bool,
    /// The service only accepts keyed traffic.
    #[serde(default)]
    pub requires_external_key: bool,
    /// Non-keyed traffic goes through the OAuth gate.
    #[serde(default = "default_oauth")]
    pub oauth_enabled: bool,
    /// Per-environment overrides, keyed by lowercase environment name.
    #[serde(default)]
    pub environment_overrides: HashMap<String, EnvOverrides>,
}

fn default_oauth() -> bool {
    true
}

impl Default for ServiceRegistryEntry {
    fn default() -> Self {
        Self {
            requires_user_profile: false,
            requires_profile_details: false,
            requires_acl_details: false,
            requires_package_acl: false,
            requires_external_key: false,
            oauth_enabled: true,
            environment_overrides: HashMap::new(),
        }
    }
}

/// The two flags an environment may override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_external_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_enabled: Option<bool>,
}

/// Flags in effect for one request, after environment resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceParam {
    pub requires_user_profile: bool,
    pub requires_profile_details: bool,
    pub requires_acl_details: bool,
    pub requires_package_acl: bool,
    pub requires_external_key: bool,
    pub oauth_enabled: bool,
}

/// Resolve the effective flags for `environment`.
///
/// Environment wins over the base entry, and only for `requires_external_key`
/// and `oauth_enabled`. The remaining flags always come from the base entry.
pub fn resolve_flags(entry: &ServiceRegistryEntry, environment: &str) -> ServiceParam {
    let mut param = ServiceParam {
        requires_user_profile: entry.requires_user_profile,
        requires_profile_details: entry.requires_profile_details,
        requires_acl_details: entry.requires_acl_details,
        requires_package_acl: entry.requires_package_acl,
        requires_external_key: entry.requires_external_key,
        oauth_enabled: entry.oauth_enabled,
    };
    if let Some(overrides) = entry.environment_overrides.get(environment) {
        if let Some(ext_key) = overrides.requires_external_key {
            param.requires_external_key = ext_key;
        }
        if let Some(oauth) = overrides.oauth_enabled {
            param.oauth_enabled = oauth;
        }
    }
    param
}

/// Identity of the requested service/version, extracted from the inbound path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteKey {
    pub service: String,
    pub version: String,
}

impl RouteKey {
    /// Parse `/{service}[/v{n}]/...` into a route key.
    ///
    /// The version defaults to `"1"` when the path carries none.
    pub fn from_path(path: &str) -> Self {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let service = segments.next().unwrap_or_default().to_string();
        let version = segments
            .next()
            .and_then(|s| s.strip_prefix('v'))
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or("1")
            .to_string();
        Self { service, version }
    }
}

/// Immutable registry table, keyed by service name then version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    services: HashMap<String, HashMap<String, ServiceRegistryEntry>>,
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used by startup wiring and tests.
    pub fn with_entry(
        mut self,
        service: impl Into<String>,
        version: impl Into<String>,
        entry: ServiceRegistryEntry,
    ) -> Self {
        self.services
            .entry(service.into())
            .or_default()
            .insert(version.into(), entry);
        self
    }

    pub fn lookup(&self, route: &RouteKey) -> Option<&ServiceRegistryEntry> {
        self.services.get(&route.service)?.get(&route.version)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

/// Atomically-replaceable snapshot reference.
///
/// Readers call [`RegistryHandle::current`] once per request and use the
/// returned `Arc` throughout; the reload path swaps the pointer with
/// [`RegistryHandle::replace`]. The snapshot itself is never edited in place.
#[derive(Debug)]
pub struct RegistryHandle {
    inner: RwLock<Arc<RegistrySnapshot>>,
}

impl RegistryHandle {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Take the current snapshot. Call once per request.
    pub fn current(&self) -> Arc<RegistrySnapshot> {
        self.inner
            .read()
            .expect("registry snapshot lock poisoned")
            .clone()
    }

    /// Swap in a new snapshot. In-flight requests keep the one they hold.
    pub fn replace(&self, snapshot: RegistrySnapshot) {
        let mut slot = self.inner.write().expect("registry snapshot lock poisoned");
        *slot = Arc::new(snapshot);
    }
}
