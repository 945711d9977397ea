//! Serving side of the audit-status protocol. Every participating node
//! exposes its own audit view here so that peers can poll it; the consuming
//! side lives in `crate::audit`.

use crate::db::{self, Pool};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auditPublishing/get/:bundle_id", get(get_audit_history))
        .with_state(state)
}

async fn get_audit_history(
    State(state): State<AppState>,
    Path(bundle_id): Path<String>,
) -> impl IntoResponse {
    match db::get_audit(&state.pool, &bundle_id).await {
        Ok(Some(audit)) => Json(audit.history).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(?err, %bundle_id, "failed to load audit history");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
