// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Public key for the configured gateway under the default issuer:
    /// "ok", "missing" or "unavailable".
    pub public_key: String,
    /// Active key store backend.
    pub key_store: String,
}

/// Simple response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Bounded by the filter's key lookup deadline.
async fn check_public_key(state: &AppState) -> &'static str {
    let deadline = state.filter.config().key_lookup_timeout;
    let lookup = state.key_store().get(state.gateway_name(), None);

    match tokio::time::timeout(deadline, lookup).await {
        Ok(Ok(Some(_))) => "ok",
        Ok(Ok(None)) => "missing",
        Ok(Err(e)) => {
            warn!(gateway_name = state.gateway_name(), error = %e, "Key store unavailable");
            "unavailable"
        }
        Err(_) => {
            warn!(
                gateway_name = state.gateway_name(),
                timeout_ms = deadline.as_millis() as u64,
                "Key store lookup timed out"
            );
            "unavailable"
        }
    }
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if the gateway public key can be resolved.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let public_key = check_public_key(&state).await;
    let ready = public_key == "ok";

    let response = ReadyResponse {
        status: if ready { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            public_key: public_key.to_string(),
            key_store: state.key_store().variant().to_string(),
        },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
