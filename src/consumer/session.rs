// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request-scoped multi-tenant sessions.
//!
//! The session key is derived from every identity dimension of the request:
//! two tenants, two keys, or two routes can never collide on the same key.
//! The backing store is an external collaborator behind [`SessionStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::context::TrustContext;

/// Fully scoped session identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionKey {
    pub tenant_id: String,
    pub internal_key: String,
    pub external_key: String,
    pub product: String,
    pub package_id: String,
    pub app_id: String,
    pub service: String,
    pub route: String,
}

impl SessionKey {
    /// Derive the key for one request from the decoded context plus the
    /// consuming service's own identity.
    pub fn for_request(context: &TrustContext, service: &str, route: &str) -> Self {
        Self {
            tenant_id: context.tenant.id.clone(),
            internal_key: context.key.internal_key.clone(),
            external_key: context.key.external_key.clone(),
            product: context.application.product.clone(),
            package_id: context.application.package_id.clone(),
            app_id: context.application.app_id.clone(),
            service: service.to_string(),
            route: route.to_string(),
        }
    }
}

/// Session handle owned by one request.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub key: SessionKey,
    pub created_at: DateTime<Utc>,
    pub attributes: Value,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Session storage contract.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, key: SessionKey, attributes: Value) -> Result<Session, SessionError>;
}

/// In-memory store used by the demo wiring and tests.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: tokio::sync::Mutex<HashMap<SessionKey, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct session keys seen. Test hook.
    pub async fn distinct_keys(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, key: SessionKey, attributes: Value) -> Result<Session, SessionError> {
        let session = Session {
            id: Uuid::new_v4(),
            key: key.clone(),
            created_at: Utc::now(),
            attributes,
        };
        self.sessions.lock().await.insert(key, session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_fixtures::full_context;

    #[test]
    fn keys_scope_by_tenant_key_and_route() {
        let context = full_context();
        let base = SessionKey::for_request(&context, "orders", "/orders/list");

        let other_route = SessionKey::for_request(&context, "orders", "/orders/get");
        assert_ne!(base, other_route);

        let other_service = SessionKey::for_request(&context, "billing", "/orders/list");
        assert_ne!(base, other_service);

        let mut other_tenant = context.clone();
        other_tenant.tenant.id = "tenant-2".into();
        assert_ne!(
            base,
            SessionKey::for_request(&other_tenant, "orders", "/orders/list")
        );

        let mut other_key = context;
        other_key.key.external_key = "ekey-2".into();
        assert_ne!(
            base,
            SessionKey::for_request(&other_key, "orders", "/orders/list")
        );
    }

    #[tokio::test]
    async fn store_creates_scoped_sessions() {
        let store = InMemorySessionStore::new();
        let context = full_context();

        let a = SessionKey::for_request(&context, "orders", "/orders/list");
        let b = SessionKey::for_request(&context, "orders", "/orders/get");
        store.create(a, Value::Null).await.unwrap();
        store.create(b, Value::Null).await.unwrap();

        assert_eq!(store.distinct_keys().await, 2);
    }
}
