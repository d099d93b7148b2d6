// SPDX-License-Identifier: AGPL-3.0-or-later

//! Service-side context consumer.
//!
//! Each downstream service runs [`consume_context`] in front of its business
//! routes. The middleware decodes the trust context header, reconstructs
//! request-scoped session and user-access state, and gates the request when
//! the service mandates a context. Business handlers pull the result through
//! the [`GateAuth`] extractor.

pub mod session;
pub mod user_access;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::context::{self, TrustContext};
use crate::error::GateError;
use crate::state::ConsumerState;

use session::{Session, SessionKey};
use user_access::UserAccessHandle;

/// What a service declares about its own needs at startup.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// The consuming service's own name, part of the session scope.
    pub service_name: String,
    /// Reject contextless requests instead of passing them through.
    pub requires_external_key: bool,
    /// Construct a session for every keyed request.
    pub with_session: bool,
    /// Construct a user-access handle when the envelope carries a user.
    pub with_user_driver: bool,
}

impl ServiceSettings {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            requires_external_key: false,
            with_session: false,
            with_user_driver: false,
        }
    }

    pub fn require_external_key(mut self) -> Self {
        self.requires_external_key = true;
        self
    }

    pub fn with_session(mut self) -> Self {
        self.with_session = true;
        self
    }

    pub fn with_user_driver(mut self) -> Self {
        self.with_user_driver = true;
        self
    }
}

/// Reconstructed per-request auth state. Owned exclusively by the request;
/// dropped when the request completes.
#[derive(Clone)]
pub struct RequestAuthState {
    pub context: TrustContext,
    pub session: Option<Session>,
    pub user: Option<UserAccessHandle>,
}

/// Consumer middleware: decode, reconstruct, gate.
pub async fn consume_context(
    State(state): State<ConsumerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let decoded = context::decode(request.headers()).filter(TrustContext::is_well_formed);

    match decoded {
        Some(trust) => {
            let route = request.uri().path().to_string();
            match build_auth_state(&state, trust, &route).await {
                Ok(auth) => {
                    request.extensions_mut().insert(auth);
                    next.run(request).await
                }
                Err(err) => {
                    err.respond(Some(state.settings.service_name.as_str()), Some(route.as_str()))
                }
            }
        }
        None if state.settings.requires_external_key => GateError::ExternalKeyRequired.respond(
            Some(state.settings.service_name.as_str()),
            Some(request.uri().path()),
        ),
        // Anonymous pass-through: the request proceeds with no tenant or
        // user identity attached.
        None => next.run(request).await,
    }
}

async fn build_auth_state(
    state: &ConsumerState,
    trust: TrustContext,
    route: &str,
) -> Result<RequestAuthState, GateError> {
    let mut auth = RequestAuthState {
        session: None,
        user: None,
        context: trust,
    };

    if state.settings.with_session {
        let key = SessionKey::for_request(&auth.context, &state.settings.service_name, route);
        let attributes = json!({
            "device": auth.context.device,
            "geo": auth.context.geo,
        });
        let session = state
            .sessions
            .create(key, attributes)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "session construction failed");
                GateError::Internal
            })?;
        auth.session = Some(session);
    }

    if state.settings.with_user_driver {
        if let Some(user) = auth.context.user_access.clone() {
            let flags = auth.context.resolved_flags;
            let preseed = flags.requires_profile_details && flags.requires_acl_details;
            auth.user = Some(UserAccessHandle::new(user, state.users.clone(), preseed));
        }
    }

    Ok(auth)
}

/// Extractor handing the reconstructed auth state to business handlers.
///
/// Rejects with `ExternalKeyRequired` when the consumer middleware attached
/// no state; use `Option<GateAuth>`-style handling via [`MaybeGateAuth`] on
/// routes that also serve anonymous traffic.
pub struct GateAuth(pub RequestAuthState);

impl<S> FromRequestParts<S> for GateAuth
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestAuthState>()
            .cloned()
            .map(GateAuth)
            .ok_or_else(|| GateError::ExternalKeyRequired.into_response())
    }
}

/// Infallible variant for routes that serve keyed and anonymous traffic.
pub struct MaybeGateAuth(pub Option<RequestAuthState>);

impl<S> FromRequestParts<S> for MaybeGateAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeGateAuth(
            parts.extensions.get::<RequestAuthState>().cloned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::session::InMemorySessionStore;
    use super::user_access::test_fixtures::CountingProvider;
    use super::*;
    use crate::context::test_fixtures::full_context;
    use axum::http::Request as HttpRequest;
    use serde_json::json;
    use std::sync::Arc;

    fn consumer_state(settings: ServiceSettings) -> ConsumerState {
        ConsumerState {
            settings: Arc::new(settings),
            sessions: Arc::new(InMemorySessionStore::new()),
            users: Arc::new(CountingProvider::new(json!({}))),
        }
    }

    #[tokio::test]
    async fn builds_session_and_user_handle_when_declared() {
        let state = consumer_state(
            ServiceSettings::new("orders")
                .require_external_key()
                .with_session()
                .with_user_driver(),
        );

        let auth = build_auth_state(&state, full_context(), "/orders/list")
            .await
            .unwrap();

        let session = auth.session.expect("session requested");
        assert_eq!(session.key.service, "orders");
        assert_eq!(session.key.tenant_id, "tenant-1");
        assert!(auth.user.is_some());
    }

    #[tokio::test]
    async fn skips_session_and_user_when_not_declared() {
        let state = consumer_state(ServiceSettings::new("orders"));
        let auth = build_auth_state(&state, full_context(), "/orders/list")
            .await
            .unwrap();
        assert!(auth.session.is_none());
        assert!(auth.user.is_none());
    }

    #[tokio::test]
    async fn preseed_follows_resolved_flags() {
        let provider = Arc::new(CountingProvider::new(json!({})));
        let state = ConsumerState {
            settings: Arc::new(ServiceSettings::new("orders").with_user_driver()),
            sessions: Arc::new(InMemorySessionStore::new()),
            users: provider.clone(),
        };

        // Both detail flags set at encode time: profile comes from the
        // envelope, never from the provider.
        let auth = build_auth_state(&state, full_context(), "/x").await.unwrap();
        auth.user.unwrap().get_profile().await.unwrap();
        assert_eq!(provider.fetch_count(), 0);

        // One flag cleared: the handle takes its own lazy fetch path.
        let mut trust = full_context();
        trust.resolved_flags.requires_acl_details = false;
        let auth = build_auth_state(&state, trust, "/x").await.unwrap();
        auth.user.unwrap().get_profile().await.unwrap();
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn extractor_rejects_without_state() {
        let mut parts = HttpRequest::builder()
            .uri("/orders/list")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = GateAuth::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());

        let maybe = MaybeGateAuth::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(maybe.0.is_none());
    }

    #[tokio::test]
    async fn extractor_returns_attached_state() {
        let state = consumer_state(ServiceSettings::new("orders"));
        let auth = build_auth_state(&state, full_context(), "/orders/list")
            .await
            .unwrap();

        let mut parts = HttpRequest::builder()
            .uri("/orders/list")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        parts.extensions.insert(auth);

        let GateAuth(auth) = GateAuth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(auth.context.tenant.id, "tenant-1");
    }
}
