//! Object routes under `/classes`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};

use crate::auth::AppAuth;
use crate::error::Result;
use crate::handlers::{handle_create, handle_delete, handle_get, handle_update};
use crate::AppState;

type Body = Map<String, Value>;

/// Create class routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/classes/{class_name}", post(create_handler))
        .route(
            "/classes/{class_name}/{object_id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
}

/// POST /classes/{class_name} - Create an object.
async fn create_handler(
    State(state): State<AppState>,
    auth: AppAuth,
    Path(class_name): Path<String>,
    Json(body): Json<Body>,
) -> Result<(StatusCode, Json<Body>)> {
    let response = handle_create(&state.storage, &auth, &class_name, &body)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /classes/{class_name}/{object_id} - Fetch an object.
async fn get_handler(
    State(state): State<AppState>,
    auth: AppAuth,
    Path((class_name, object_id)): Path<(String, String)>,
) -> Result<Json<Body>> {
    let response = handle_get(&state.storage, &auth, &class_name, &object_id)?;
    Ok(Json(response))
}

/// PUT /classes/{class_name}/{object_id} - Update an object.
async fn update_handler(
    State(state): State<AppState>,
    auth: AppAuth,
    Path((class_name, object_id)): Path<(String, String)>,
    Json(body): Json<Body>,
) -> Result<Json<Body>> {
    let response = handle_update(&state.storage, &auth, &class_name, &object_id, &body)?;
    Ok(Json(response))
}

/// DELETE /classes/{class_name}/{object_id} - Delete an object.
async fn delete_handler(
    State(state): State<AppState>,
    auth: AppAuth,
    Path((class_name, object_id)): Path<(String, String)>,
) -> Result<Json<Body>> {
    let response = handle_delete(&state.storage, &auth, &class_name, &object_id)?;
    Ok(Json(response))
}
