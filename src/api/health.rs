// SPDX-License-Identifier: AGPL-3.0-or-later

//! Liveness endpoint, open on both process roles.

use axum::Json;
use serde::Serialize;

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint handler. Always 200; the process answering at all
/// is the signal.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
