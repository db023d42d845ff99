// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{middleware, routing::get, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{jwt_auth_middleware, App, AuthResult, Gateway, User},
    state::AppState,
};

pub mod health;
pub mod whoami;

pub fn router(state: AppState) -> Router {
    // Every /v1 route sits behind the gateway token filter.
    let v1_routes = Router::new()
        .route("/whoami", get(whoami::whoami))
        .route_layer(middleware::from_fn_with_state(
            state.filter.clone(),
            jwt_auth_middleware,
        ));

    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    Router::new()
        .nest("/v1", v1_routes)
        .nest("/health", health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(health::liveness, health::readiness, whoami::whoami),
    components(
        schemas(
            AuthResult,
            Gateway,
            App,
            User,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Identity", description = "Caller identity resolved from the gateway token")
    )
)]
struct ApiDoc;
