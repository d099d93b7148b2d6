// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gateway-side trust context builder.
//!
//! [`gate_request`] runs in front of the proxy dispatch: it resolves the
//! registry entry for the requested route, resolves the external key and
//! package (at most once each), runs the security check pipeline, assembles
//! the redacted trust context, and attaches the encoded envelope to the
//! forwarded request. Any terminal condition short-circuits into the
//! structured failure envelope; the request never reaches dispatch.

use async_trait::async_trait;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::context::{
    self, ApplicationScope, KeyScope, PackageScope, ResolvedFlags, TenantScope, TrustContext,
};
use crate::error::GateError;
use crate::pipeline::{CheckContext, RequestSnapshot};
use crate::provision::merge::{apply_acl_redaction, merge_service_config};
use crate::registry::{resolve_flags, RouteKey, ServiceParam};
use crate::state::GatewayState;

/// Header the caller supplies its opaque external key in.
pub const EXTERNAL_KEY_HEADER: &str = "key";

/// Gate for non-keyed flows on services with OAuth enabled. The gateway
/// delegates and forwards without building a trust context.
#[async_trait]
pub trait OauthGate: Send + Sync {
    async fn authorize(&self, request: &RequestSnapshot) -> Result<(), GateError>;
}

/// Accepts every non-keyed request. Demo stand-in for a real OAuth gate.
pub struct AllowAllOauthGate;

#[async_trait]
impl OauthGate for AllowAllOauthGate {
    async fn authorize(&self, _request: &RequestSnapshot) -> Result<(), GateError> {
        Ok(())
    }
}

/// Gateway middleware: build the trust context or terminate the request.
pub async fn gate_request(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let route = RouteKey::from_path(request.uri().path());
    let path = request.uri().path().to_string();
    match build_forwardable(&state, &route, request).await {
        Ok(forward) => next.run(forward).await,
        Err(err) => {
            tracing::info!(
                service = %route.service,
                version = %route.version,
                code = err.code(),
                "request terminated at the gate"
            );
            err.respond(Some(route.service.as_str()), Some(path.as_str()))
        }
    }
}

/// The builder proper. Returns the request to forward, header attached when
/// a context was built.
async fn build_forwardable(
    state: &GatewayState,
    route: &RouteKey,
    mut request: Request,
) -> Result<Request, GateError> {
    // One snapshot per request; the reload path swaps the pointer wholesale.
    let registry = state.registry.current();
    let entry = registry
        .lookup(route)
        .ok_or_else(|| GateError::ServiceUnknown {
            service: route.service.clone(),
            version: route.version.clone(),
        })?;
    let param = resolve_flags(entry, &state.environment);

    if !param.requires_external_key {
        if param.oauth_enabled {
            let snapshot = RequestSnapshot::from_request(&request);
            state.oauth_gate.authorize(&snapshot).await?;
        }
        // Non-keyed flow: forwarded without a trust context.
        return Ok(request);
    }

    let token = request
        .headers()
        .get(EXTERNAL_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if token.is_empty() {
        return Err(GateError::InvalidKey);
    }

    let key_record = match state.resolver.resolve_key(token, &state.key_secret).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err(GateError::InvalidKey),
        Err(err) => {
            tracing::error!(error = %err, "key resolver failed");
            return Err(GateError::KeyResolutionException);
        }
    };

    // A valid key must point at a resolvable package; its absence here is a
    // data-integrity failure, not "no key".
    let package = match state
        .resolver
        .resolve_package(&key_record.application.package_id)
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return Err(GateError::PackageNotFound),
        Err(err) => {
            tracing::error!(error = %err, "package resolver failed");
            return Err(GateError::KeyResolutionException);
        }
    };

    let snapshot = RequestSnapshot::from_request(&request);
    let ctx = CheckContext::new(snapshot, route.clone(), param.clone(), key_record, package);
    let ctx = state.pipeline.run(ctx).await?;

    let trust = assemble_context(ctx, &param);
    let header = context::encode(&trust)?;
    request
        .headers_mut()
        .insert(context::CONTEXT_HEADER, header);
    Ok(request)
}

/// Assemble the envelope from the post-pipeline state: merge the service
/// configuration, attach the user conditionally, redact ACLs last.
fn assemble_context(ctx: CheckContext, param: &ServiceParam) -> TrustContext {
    let config = merge_service_config(&ctx.services_config, &ctx.route.service);
    let key = ctx.key;

    let mut trust = TrustContext {
        tenant: TenantScope {
            id: key.tenant.id,
            code: key.tenant.code,
            roaming: key.tenant.roaming,
        },
        key: KeyScope {
            config,
            internal_key: key.internal_key,
            external_key: key.external_key,
        },
        application: ApplicationScope {
            product: key.application.product,
            package_id: key.application.package_id,
            app_id: key.application.app_id,
            acl: key.application.acl,
            acl_all_env: key.application.acl_all_env,
        },
        package: PackageScope {
            acl: ctx.package.acl,
            acl_all_env: ctx.package.acl_all_env,
        },
        device: ctx.device,
        geo: ctx.geo,
        user_access: None,
        resolved_flags: ResolvedFlags {
            requires_profile_details: param.requires_profile_details,
            requires_acl_details: param.requires_acl_details,
        },
    };

    if param.requires_user_profile {
        if let Some(mut user) = ctx.user {
            if !param.requires_profile_details {
                user.profile = None;
            }
            if !param.requires_acl_details {
                user.acl = None;
                user.acl_all_env = None;
            }
            trust.user_access = Some(user);
        }
    }

    apply_acl_redaction(&mut trust, param.requires_package_acl);
    trust
}
