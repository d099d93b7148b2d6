// SPDX-License-Identifier: AGPL-3.0-or-later

//! The security check pipeline.
//!
//! An ordered chain of checks runs between key/package resolution and trust
//! context assembly: `geo → device → oauth → user_access → service_level →
//! api_level`. Execution is strictly sequential, since later checks read
//! fields written by earlier ones, and short-circuits on the first error, which is
//! propagated to the caller unchanged.
//!
//! The pipeline owns only the ordering, the shared-context threading, and
//! the short-circuit contract; the concrete check bodies are collaborators
//! (see [`checks`] for the in-process reference implementations).

pub mod checks;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::HeaderMap;
use serde_json::{Map, Value};

use crate::context::UserAccess;
use crate::error::GateError;
use crate::provision::{KeyRecord, PackageRecord};
use crate::registry::{RouteKey, ServiceParam};

/// Immutable view of the inbound request handed to every check.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
}

impl RequestSnapshot {
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            headers: request.headers().clone(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The accumulated state threaded through the chain.
///
/// Checks receive ownership, mutate what they are responsible for, and hand
/// the context to the next check in line.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub request: RequestSnapshot,
    pub route: RouteKey,
    pub param: ServiceParam,
    pub key: KeyRecord,
    pub package: PackageRecord,
    /// Tenant-wide configuration; a check may narrow it before assembly.
    pub services_config: Map<String, Value>,
    /// Written by the geo check.
    pub geo: Option<Value>,
    /// Written by the device check.
    pub device: Option<Value>,
    /// Written by the user-access check when authentication produced an
    /// identity.
    pub user: Option<UserAccess>,
}

impl CheckContext {
    pub fn new(
        request: RequestSnapshot,
        route: RouteKey,
        param: ServiceParam,
        key: KeyRecord,
        package: PackageRecord,
    ) -> Self {
        let services_config = key.services_config.clone();
        Self {
            request,
            route,
            param,
            key,
            package,
            services_config,
            geo: None,
            device: None,
            user: None,
        }
    }
}

/// One pluggable security check.
#[async_trait]
pub trait SecurityCheck: Send + Sync {
    /// Stable name, used for logging and pipeline introspection.
    fn name(&self) -> &'static str;

    /// Inspect/extend the context or reject the request.
    async fn check(&self, ctx: CheckContext) -> Result<CheckContext, GateError>;
}

/// Ordered, short-circuiting chain of checks.
pub struct SecurityPipeline {
    checks: Vec<Arc<dyn SecurityCheck>>,
}

impl SecurityPipeline {
    /// Assemble a pipeline from an explicit ordered list.
    pub fn new(checks: Vec<Arc<dyn SecurityCheck>>) -> Self {
        Self { checks }
    }

    /// The declared six-slot order. Callers supply the check bodies; the
    /// pipeline fixes the sequence.
    pub fn standard(
        geo: Arc<dyn SecurityCheck>,
        device: Arc<dyn SecurityCheck>,
        oauth: Arc<dyn SecurityCheck>,
        user_access: Arc<dyn SecurityCheck>,
        service_level: Arc<dyn SecurityCheck>,
        api_level: Arc<dyn SecurityCheck>,
    ) -> Self {
        Self::new(vec![geo, device, oauth, user_access, service_level, api_level])
    }

    /// Run every check in order. The first error aborts the rest and is
    /// returned unchanged.
    pub async fn run(&self, mut ctx: CheckContext) -> Result<CheckContext, GateError> {
        for check in &self.checks {
            tracing::debug!(check = check.name(), service = %ctx.route.service, "running security check");
            ctx = check.check(ctx).await?;
        }
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::checks::PermissiveCheck;
    use super::*;
    use crate::provision::test_fixtures::key_record;
    use crate::registry::{resolve_flags, ServiceRegistryEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_context() -> CheckContext {
        CheckContext::new(
            RequestSnapshot {
                method: "GET".into(),
                path: "/orders/list".into(),
                headers: HeaderMap::new(),
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

    /// Counts invocations; fails when told to.
    struct CountingCheck {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail_with: Option<GateError>,
    }

    #[async_trait]
    impl SecurityCheck for CountingCheck {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn check(&self, ctx: CheckContext) -> Result<CheckContext, GateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(ctx),
            }
        }
    }

    fn counting(
        name: &'static str,
        fail_with: Option<GateError>,
    ) -> (Arc<dyn SecurityCheck>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let check = Arc::new(CountingCheck {
            name,
            calls: calls.clone(),
            fail_with,
        });
        (check, calls)
    }

    #[tokio::test]
    async fn runs_all_checks_in_order_when_clean() {
        let (geo, geo_calls) = counting("geo", None);
        let (device, device_calls) = counting("device", None);
        let pipeline = SecurityPipeline::new(vec![geo, device]);

        pipeline.run(test_context()).await.unwrap();
        assert_eq!(geo_calls.load(Ordering::SeqCst), 1);
        assert_eq!(device_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_failure_short_circuits_the_rest() {
        let rejection = GateError::CheckFailed {
            code: 155,
            message: "device not allowed".into(),
        };
        let (first, first_calls) = counting("geo", None);
        let (second, second_calls) = counting("device", Some(rejection.clone()));
        let (third, third_calls) = counting("oauth", None);
        let (fourth, fourth_calls) = counting("user_access", None);
        let (fifth, fifth_calls) = counting("service_level", None);
        let (sixth, sixth_calls) = counting("api_level", None);

        let pipeline =
            SecurityPipeline::standard(first, second, third, fourth, fifth, sixth);
        let err = pipeline.run(test_context()).await.unwrap_err();

        // The error comes back exactly as the failing check produced it.
        assert_eq!(err, rejection);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fourth_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fifth_calls.load(Ordering::SeqCst), 0);
        assert_eq!(sixth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn later_checks_see_fields_written_by_earlier_ones() {
        struct GeoWriter;

        #[async_trait]
        impl SecurityCheck for GeoWriter {
            fn name(&self) -> &'static str {
                "geo"
            }

            async fn check(&self, mut ctx: CheckContext) -> Result<CheckContext, GateError> {
                ctx.geo = Some(serde_json::json!({"country": "IS"}));
                Ok(ctx)
            }
        }

        struct GeoReader;

        #[async_trait]
        impl SecurityCheck for GeoReader {
            fn name(&self) -> &'static str {
                "device"
            }

            async fn check(&self, ctx: CheckContext) -> Result<CheckContext, GateError> {
                assert_eq!(ctx.geo.as_ref().unwrap()["country"], "IS");
                Ok(ctx)
            }
        }

        let pipeline = SecurityPipeline::new(vec![
            Arc::new(GeoWriter),
            Arc::new(GeoReader),
            Arc::new(PermissiveCheck::new("oauth")),
        ]);
        let ctx = pipeline.run(test_context()).await.unwrap();
        assert!(ctx.geo.is_some());
    }
}
