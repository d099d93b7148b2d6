// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gateway failure taxonomy.
//!
//! Every terminal condition surfaces as a single [`GateError`] value carrying
//! a stable numeric code. The numeric values are fixed for a deployment: both
//! processes and any monitoring built on top key off them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;

/// Terminal authorization failure.
///
/// Pipeline-check failures are carried through [`GateError::CheckFailed`]
/// verbatim: the builder never rewrites a check's code or message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// No registry entry for the requested service/version.
    ServiceUnknown { service: String, version: String },
    /// The downstream service mandates a trust context and none was usable.
    ExternalKeyRequired,
    /// Unexpected failure while invoking the key resolver.
    KeyResolutionException,
    /// The resolved key pointed at a package that could not be resolved.
    PackageNotFound,
    /// Key resolution failed or returned nothing.
    InvalidKey,
    /// A security check rejected the request; surfaced unchanged.
    CheckFailed { code: u32, message: String },
    /// Internal failure (codec, session store). Detail is logged at the
    /// failure site, never exposed in the response.
    Internal,
}

#[derive(Serialize)]
struct FailureEnvelope {
    result: bool,
    ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<FailingRoute>,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct FailingRoute {
    service: String,
    route: String,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: u32,
    message: String,
}

impl GateError {
    /// Stable numeric code for this failure.
    pub fn code(&self) -> u32 {
        match self {
            GateError::ServiceUnknown { .. } => 133,
            GateError::ExternalKeyRequired => 142,
            GateError::KeyResolutionException => 150,
            GateError::Internal => 151,
            GateError::PackageNotFound => 152,
            GateError::InvalidKey => 153,
            GateError::CheckFailed { code, .. } => *code,
        }
    }

    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::ServiceUnknown { .. } => StatusCode::NOT_FOUND,
            GateError::ExternalKeyRequired | GateError::InvalidKey => StatusCode::UNAUTHORIZED,
            GateError::CheckFailed { .. } => StatusCode::FORBIDDEN,
            GateError::KeyResolutionException
            | GateError::PackageNotFound
            | GateError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the structured failure response, naming the failing
    /// service/route when known.
    pub fn respond(&self, service: Option<&str>, route: Option<&str>) -> Response {
        let envelope = FailureEnvelope {
            result: false,
            ts: Utc::now().timestamp_millis(),
            service: service.map(|s| FailingRoute {
                service: s.to_string(),
                route: route.unwrap_or("").to_string(),
            }),
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (self.status_code(), Json(envelope)).into_response()
    }
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::ServiceUnknown { service, version } => {
                write!(f, "Unknown service [{service}] version [{version}]")
            }
            GateError::ExternalKeyRequired => {
                write!(f, "This service requires an external key")
            }
            GateError::KeyResolutionException => write!(f, "External key resolution failed"),
            GateError::PackageNotFound => write!(f, "No package found for the resolved key"),
            GateError::InvalidKey => write!(f, "Invalid or unrecognized external key"),
            GateError::CheckFailed { message, .. } => write!(f, "{message}"),
            GateError::Internal => write!(f, "Internal authorization error"),
        }
    }
}

impl std::error::Error for GateError {}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        self.respond(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            GateError::ServiceUnknown {
                service: "orders".into(),
                version: "1".into()
            }
            .code(),
            133
        );
        assert_eq!(GateError::ExternalKeyRequired.code(), 142);
        assert_eq!(GateError::KeyResolutionException.code(), 150);
        assert_eq!(GateError::PackageNotFound.code(), 152);
        assert_eq!(GateError::InvalidKey.code(), 153);
    }

    #[test]
    fn check_failures_keep_their_own_code() {
        let err = GateError::CheckFailed {
            code: 170,
            message: "geo restriction".into(),
        };
        assert_eq!(err.code(), 170);
        assert_eq!(err.to_string(), "geo restriction");
    }

    #[tokio::test]
    async fn envelope_identifies_failing_route() {
        let response = GateError::InvalidKey.respond(Some("orders"), Some("/orders/list"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["result"], false);
        assert_eq!(body["error"]["code"], 153);
        assert_eq!(body["service"]["service"], "orders");
        assert_eq!(body["service"]["route"], "/orders/list");
    }

    #[tokio::test]
    async fn envelope_omits_route_when_unknown() {
        let response = GateError::ExternalKeyRequired.into_response();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert!(body.get("service").is_none());
        assert_eq!(body["error"]["code"], 142);
    }
}
