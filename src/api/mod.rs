// SPDX-License-Identifier: AGPL-3.0-or-later

//! Router assembly for the two process roles.
//!
//! The gateway router gates every route except `/health` and hands gated
//! requests to a dispatch stand-in (the real reverse proxy is an external
//! collaborator). The service router shows the consumer wiring a downstream
//! service embeds in front of its business routes.

use axum::{extract::Request, middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::consumer::{self, MaybeGateAuth};
use crate::context::CONTEXT_HEADER;
use crate::gateway;
use crate::state::{ConsumerState, GatewayState};

pub mod health;

/// Build the gateway-process router.
pub fn gateway_router(state: GatewayState) -> Router {
    let gated = Router::new()
        .fallback(dispatch_stub)
        .layer(middleware::from_fn_with_state(state, gateway::gate_request));

    Router::new()
        .route("/health", get(health::health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Build a service-process router around the supplied business routes.
pub fn service_router(state: ConsumerState, business: Router) -> Router {
    let guarded = business.layer(middleware::from_fn_with_state(
        state,
        consumer::consume_context,
    ));

    Router::new()
        .route("/health", get(health::health))
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
}

/// Stand-in for the reverse-proxy dispatch collaborator: reports what would
/// be forwarded.
async fn dispatch_stub(request: Request) -> Json<Value> {
    let context_attached = request.headers().contains_key(CONTEXT_HEADER);
    Json(json!({
        "forwarded": true,
        "path": request.uri().path(),
        "context_attached": context_attached,
    }))
}

/// Demo business handler: reports the identity the consumer reconstructed.
pub async fn whoami(MaybeGateAuth(auth): MaybeGateAuth) -> Json<Value> {
    match auth {
        Some(auth) => Json(json!({
            "anonymous": false,
            "tenant": auth.context.tenant.code,
            "user": auth.context.user_access.as_ref().map(|u| u.username.clone()),
            "session": auth.session.as_ref().map(|s| s.id),
        })),
        None => Json(json!({ "anonymous": true })),
    }
}
