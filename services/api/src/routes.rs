use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use beid_intake::beid::{
    card_router, AuditSink, CardHolder, CardReconciler, Geography, HolderRepository,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_card_routes<H, R, G, A>(
    reconciler: Arc<CardReconciler<H, R, G, A>>,
) -> axum::Router
where
    H: CardHolder + Serialize,
    R: HolderRepository<H> + 'static,
    G: Geography + 'static,
    A: AuditSink + 'static,
{
    card_router(reconciler)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
