// SPDX-License-Identifier: AGPL-3.0-or-later

//! External key and package resolution.
//!
//! The gateway resolves the caller's opaque external key to a [`KeyRecord`]
//! and, from it, a [`PackageRecord`]. The backing store is an external
//! collaborator behind the [`KeyResolver`] trait; at most one call of each
//! kind happens per inbound request.

pub mod merge;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Tenant portion of a resolved key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roaming: Option<Value>,
}

/// Application the key was issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub product: String,
    pub package_id: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_all_env: Option<Value>,
}

/// Result of resolving a valid external key.
///
/// `services_config` is the tenant-wide configuration blob, keyed by service
/// name plus the reserved common-fields bucket. It never crosses the process
/// boundary as-is; the merge step narrows it first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub tenant: TenantRecord,
    pub internal_key: String,
    pub external_key: String,
    pub application: ApplicationRecord,
    #[serde(default)]
    pub services_config: Map<String, Value>,
}

/// Entitlements of the package the application is assigned to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_all_env: Option<Value>,
}

/// Failure inside the resolver collaborator, distinct from "not found".
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("provision store unavailable: {0}")]
    Unavailable(String),
    #[error("provision record corrupt: {0}")]
    Corrupt(String),
}

/// Resolution contract consumed by the gateway-side builder.
///
/// Both calls are side-effect-free from the caller's perspective; a `None`
/// result is a clean "no such record", an `Err` is an unexpected failure.
/// Retries, if any, belong to the implementation, not the caller.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve_key(
        &self,
        external_key: &str,
        signing_secret: &str,
    ) -> Result<Option<KeyRecord>, ResolverError>;

    async fn resolve_package(&self, package_id: &str)
        -> Result<Option<PackageRecord>, ResolverError>;
}

/// In-memory resolver backed by a static table.
///
/// Reference implementation of the resolver contract, used by the demo
/// binary (loaded from a JSON provision file) and by tests. It ignores the
/// signing secret; a production resolver validates the key against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticKeyStore {
    #[serde(default)]
    keys: HashMap<String, KeyRecord>,
    #[serde(default)]
    packages: HashMap<String, PackageRecord>,
}

impl StaticKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, record: KeyRecord) -> Self {
        self.keys.insert(record.external_key.clone(), record);
        self
    }

    pub fn with_package(mut self, package_id: impl Into<String>, record: PackageRecord) -> Self {
        self.packages.insert(package_id.into(), record);
        self
    }
}

#[async_trait]
impl KeyResolver for StaticKeyStore {
    async fn resolve_key(
        &self,
        external_key: &str,
        _signing_secret: &str,
    ) -> Result<Option<KeyRecord>, ResolverError> {
        Ok(self.keys.get(external_key).cloned())
    }

    async fn resolve_package(
        &self,
        package_id: &str,
    ) -> Result<Option<PackageRecord>, ResolverError> {
        Ok(self.packages.get(package_id).cloned())
    }
}
