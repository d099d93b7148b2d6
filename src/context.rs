// SPDX-License-Identifier: AGPL-3.0-or-later

//! The trust context envelope and its transport codec.
//!
//! The [`TrustContext`] is the only artifact crossing the gateway→service
//! boundary. It travels JSON-encoded in a single reserved header; the
//! envelope is plain structured data trusted only because it crosses an
//! internal hop, so there is no signing layer here.
//!
//! Redaction is encoded as omission: fields the resolving service is not
//! entitled to are absent from the serialized form, never null-filled.

use axum::http::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GateError;

/// The reserved header carrying the encoded trust context between processes.
pub const CONTEXT_HEADER: &str = "x-gate-context";

/// Tenant identity resolved from the external key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantScope {
    pub id: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roaming: Option<Value>,
}

/// Key material and the merged per-service configuration.
///
/// `config` is always the merged configuration, never the raw tenant-wide
/// blob (see [`crate::provision::merge::merge_service_config`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyScope {
    pub config: Map<String, Value>,
    pub internal_key: String,
    pub external_key: String,
}

/// Application the key belongs to. ACL fields are present iff the resolving
/// service declares `requires_package_acl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationScope {
    pub product: String,
    pub package_id: String,
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_all_env: Option<Value>,
}

/// Package entitlements, redacted together with the application ACLs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_all_env: Option<Value>,
}

/// Tenant the authenticated user belongs to (may differ from the key tenant
/// when roaming).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTenant {
    pub id: String,
    pub code: String,
}

/// The authenticated user carried in the envelope.
///
/// `profile` is present iff `requires_profile_details`; `acl`/`acl_all_env`
/// iff `requires_acl_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccess {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_login: Option<Value>,
    pub tenant: UserTenant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_all_env: Option<Value>,
}

/// Detail flags resolved at encode time, consulted by the consumer for the
/// profile pre-seed decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFlags {
    pub requires_profile_details: bool,
    pub requires_acl_details: bool,
}

/// The sealed bundle of tenant/application/package/user data handed to a
/// service for one request. Constructed once, serialized once, deserialized
/// once, never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustContext {
    pub tenant: TenantScope,
    pub key: KeyScope,
    pub application: ApplicationScope,
    pub package: PackageScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_access: Option<UserAccess>,
    #[serde(default)]
    pub resolved_flags: ResolvedFlags,
}

impl TrustContext {
    /// A decoded context is usable only when the identifying scopes survived
    /// the hop intact.
    pub fn is_well_formed(&self) -> bool {
        !self.tenant.id.is_empty()
            && !self.key.internal_key.is_empty()
            && !self.application.package_id.is_empty()
    }
}

/// Serialize the context into the transport header value.
pub fn encode(context: &TrustContext) -> Result<HeaderValue, GateError> {
    let bytes = serde_json::to_vec(context).map_err(|err| {
        tracing::error!(error = %err, "trust context serialization failed");
        GateError::Internal
    })?;
    HeaderValue::from_bytes(&bytes).map_err(|err| {
        tracing::error!(error = %err, "trust context not header-safe");
        GateError::Internal
    })
}

/// Decode the context from the inbound headers.
///
/// Absence and unparsable values both yield `None`: an anonymous/public
/// request is a legitimate state, not a protocol violation. The consumer
/// decides rejection from the service's own declared requirement.
pub fn decode(headers: &HeaderMap) -> Option<TrustContext> {
    let raw = headers.get(CONTEXT_HEADER)?;
    match serde_json::from_slice(raw.as_bytes()) {
        Ok(context) => Some(context),
        Err(err) => {
            tracing::warn!(error = %err, "discarding unparsable trust context header");
            None
        }
    }
}
