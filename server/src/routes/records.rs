//! Collection routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use syncstore_engine::{Pagination, Record};

use crate::error::Result;
use crate::handlers::{handle_create, handle_delete, handle_get, handle_list, handle_replace};
use crate::AppState;

/// Create collection routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/{collection}", get(list_handler).post(create_handler))
        .route(
            "/{collection}/{id}",
            get(get_handler).put(replace_handler).delete(delete_handler),
        )
}

/// GET /{collection} - List records, optionally paged.
async fn list_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Record>>> {
    let records = handle_list(&state.db, &collection, page)?;
    Ok(Json(records))
}

/// POST /{collection} - Store a new record.
async fn create_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(record): Json<Record>,
) -> Result<(StatusCode, Json<Record>)> {
    let created = handle_create(&state.db, &collection, record)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /{collection}/{id} - Fetch one record.
async fn get_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Record>> {
    Ok(Json(handle_get(&state.db, &collection, &id)?))
}

/// PUT /{collection}/{id} - Replace one record.
async fn replace_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(record): Json<Record>,
) -> Result<Json<Record>> {
    Ok(Json(handle_replace(&state.db, &collection, &id, record)?))
}

/// DELETE /{collection}/{id} - Remove one record.
async fn delete_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    handle_delete(&state.db, &collection, &id)?;
    Ok(StatusCode::NO_CONTENT)
}
