// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared process state for the two middleware sides.

use std::sync::Arc;

use crate::consumer::session::SessionStore;
use crate::consumer::user_access::UserAccessProvider;
use crate::consumer::ServiceSettings;
use crate::gateway::{AllowAllOauthGate, OauthGate};
use crate::pipeline::checks::{DeviceStamp, GeoStamp, PermissiveCheck};
use crate::pipeline::SecurityPipeline;
use crate::provision::{KeyResolver, StaticKeyStore};
use crate::registry::{RegistryHandle, RegistrySnapshot};

/// State of the gateway process. Cheap to clone; the collaborators are
/// shared behind `Arc`.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<RegistryHandle>,
    pub resolver: Arc<dyn KeyResolver>,
    pub pipeline: Arc<SecurityPipeline>,
    pub oauth_gate: Arc<dyn OauthGate>,
    /// Current environment name, lowercase. Read once at startup and passed
    /// into flag resolution explicitly.
    pub environment: String,
    /// Secret handed to the key resolver alongside the external key.
    pub key_secret: String,
}

impl GatewayState {
    pub fn builder(
        environment: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> GatewayStateBuilder {
        GatewayStateBuilder {
            registry: None,
            resolver: None,
            pipeline: None,
            oauth_gate: None,
            environment: environment.into(),
            key_secret: key_secret.into(),
        }
    }
}

/// Builder over [`GatewayState`]. Unset collaborators fall back to the
/// in-process reference implementations (empty registry, static resolver,
/// permissive pipeline and OAuth gate).
pub struct GatewayStateBuilder {
    registry: Option<RegistryHandle>,
    resolver: Option<Arc<dyn KeyResolver>>,
    pipeline: Option<Arc<SecurityPipeline>>,
    oauth_gate: Option<Arc<dyn OauthGate>>,
    environment: String,
    key_secret: String,
}

impl GatewayStateBuilder {
    pub fn registry(mut self, registry: RegistryHandle) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<SecurityPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn oauth_gate(mut self, gate: Arc<dyn OauthGate>) -> Self {
        self.oauth_gate = Some(gate);
        self
    }

    pub fn build(self) -> GatewayState {
        GatewayState {
            registry: Arc::new(
                self.registry
                    .unwrap_or_else(|| RegistryHandle::new(RegistrySnapshot::new())),
            ),
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(StaticKeyStore::new())),
            pipeline: self.pipeline.unwrap_or_else(default_pipeline),
            oauth_gate: self
                .oauth_gate
                .unwrap_or_else(|| Arc::new(AllowAllOauthGate)),
            environment: self.environment,
            key_secret: self.key_secret,
        }
    }
}

fn default_pipeline() -> Arc<SecurityPipeline> {
    Arc::new(SecurityPipeline::standard(
        Arc::new(GeoStamp),
        Arc::new(DeviceStamp),
        Arc::new(PermissiveCheck::new("oauth")),
        Arc::new(PermissiveCheck::new("user_access")),
        Arc::new(PermissiveCheck::new("service_level")),
        Arc::new(PermissiveCheck::new("api_level")),
    ))
}

/// State of a downstream service process.
#[derive(Clone)]
pub struct ConsumerState {
    pub settings: Arc<ServiceSettings>,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserAccessProvider>,
}

impl ConsumerState {
    pub fn new(
        settings: ServiceSettings,
        sessions: Arc<dyn SessionStore>,
        users: Arc<dyn UserAccessProvider>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            sessions,
            users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RouteKey;

    #[test]
    fn builder_defaults_are_usable() {
        let state = GatewayState::builder("dev", "secret").build();
        assert_eq!(state.environment, "dev");
        let route = RouteKey {
            service: "orders".into(),
            version: "1".into(),
        };
        assert!(state.registry.current().lookup(&route).is_none());
    }
}
