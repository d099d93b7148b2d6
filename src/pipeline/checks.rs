// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process reference implementations of the check contract.
//!
//! Production deployments plug their own geo/device/OAuth/user-profile
//! bodies into the pipeline; these implementations cover the demo wiring and
//! tests. They honor the contract exactly: stamp what they own, touch
//! nothing else, reject by returning an error unchanged downstream.

use async_trait::async_trait;
use serde_json::json;

use crate::context::UserAccess;
use crate::error::GateError;

use super::{CheckContext, SecurityCheck};

/// Stamps coarse geo data from the forwarding headers. Always passes.
pub struct GeoStamp;

#[async_trait]
impl SecurityCheck for GeoStamp {
    fn name(&self) -> &'static str {
        "geo"
    }

    async fn check(&self, mut ctx: CheckContext) -> Result<CheckContext, GateError> {
        let ip = ctx
            .request
            .header("x-forwarded-for")
            .map(|raw| raw.split(',').next().unwrap_or(raw).trim().to_string());
        ctx.geo = Some(json!({ "ip": ip }));
        Ok(ctx)
    }
}

/// Stamps the caller's user agent as the device record. Always passes.
pub struct DeviceStamp;

#[async_trait]
impl SecurityCheck for DeviceStamp {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn check(&self, mut ctx: CheckContext) -> Result<CheckContext, GateError> {
        let agent = ctx.request.header("user-agent").unwrap_or_default();
        ctx.device = Some(json!({ "agent": agent }));
        Ok(ctx)
    }
}

/// A check slot that accepts everything. Stands in for check bodies the
/// deployment leaves unconfigured.
pub struct PermissiveCheck {
    name: &'static str,
}

impl PermissiveCheck {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl SecurityCheck for PermissiveCheck {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn check(&self, ctx: CheckContext) -> Result<CheckContext, GateError> {
        Ok(ctx)
    }
}

/// User-access slot that attaches a fixed identity. Test/demo stand-in for a
/// real session-backed authenticator.
pub struct StaticUserAccess {
    user: UserAccess,
}

impl StaticUserAccess {
    pub fn new(user: UserAccess) -> Self {
        Self { user }
    }
}

#[async_trait]
impl SecurityCheck for StaticUserAccess {
    fn name(&self) -> &'static str {
        "user_access"
    }

    async fn check(&self, mut ctx: CheckContext) -> Result<CheckContext, GateError> {
        ctx.user = Some(self.user.clone());
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RequestSnapshot, SecurityPipeline};
    use crate::provision::test_fixtures::key_record;
    use crate::provision::PackageRecord;
    use crate::registry::{resolve_flags, RouteKey, ServiceRegistryEntry};
    use axum::http::HeaderMap;
    use std::sync::Arc;

    fn context_with_headers(headers: HeaderMap) -> CheckContext {
        CheckContext::new(
            RequestSnapshot {
                method: "GET".into(),
                path: "/orders/list".into(),
                headers,
            },
            RouteKey {
                service: "orders".into(),
                version: "1".into(),
            },
            resolve_flags(&ServiceRegistryEntry::default(), "dev"),
            key_record("ekey-1", "COMM_BASIC"),
            PackageRecord::default(),
        )
    }

    #[tokio::test]
    async fn geo_stamp_records_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3, 172.16.0.1".parse().unwrap());

        let ctx = GeoStamp.check(context_with_headers(headers)).await.unwrap();
        assert_eq!(ctx.geo.unwrap()["ip"], "10.1.2.3");
    }

    #[tokio::test]
    async fn device_stamp_records_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "cli/1.0".parse().unwrap());

        let ctx = DeviceStamp
            .check(context_with_headers(headers))
            .await
            .unwrap();
        assert_eq!(ctx.device.unwrap()["agent"], "cli/1.0");
    }

    #[tokio::test]
    async fn standard_wiring_stamps_geo_and_device() {
        let pipeline = SecurityPipeline::standard(
            Arc::new(GeoStamp),
            Arc::new(DeviceStamp),
            Arc::new(PermissiveCheck::new("oauth")),
            Arc::new(PermissiveCheck::new("user_access")),
            Arc::new(PermissiveCheck::new("service_level")),
            Arc::new(PermissiveCheck::new("api_level")),
        );

        let ctx = pipeline
            .run(context_with_headers(HeaderMap::new()))
            .await
            .unwrap();
        assert!(ctx.geo.is_some());
        assert!(ctx.device.is_some());
        assert!(ctx.user.is_none());
    }
}
