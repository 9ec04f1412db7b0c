use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::database::DatabaseManager;
use crate::state::AppState;

/// GET / - Service description
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let groups: Vec<&str> = state.plan.groups().map(|g| g.name.as_str()).collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "Plan Store API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Plan-driven, permission-aware record store",
            "groups": groups,
            "endpoints": {
                "list": "POST /rest/:group/filtered/:types",
                "create": "POST /rest/:group",
                "update": "PUT /rest/:group",
                "delete": "DELETE /rest/:group",
                "plan": "GET /rest/:group/plan",
                "health": "GET /health",
            }
        }
    }))
}

/// GET /health - Database connectivity
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(state.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
