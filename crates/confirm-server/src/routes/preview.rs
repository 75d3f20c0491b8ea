use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ApiResult;
use crate::engine::Preview;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/preview/refresh", post(refresh))
        .route("/preview/{template}", get(preview))
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    lang: Option<String>,
}

async fn preview(
    State(state): State<AppState>,
    Path(template): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<Preview> {
    Ok(Json(
        state.engine.preview(&template, query.lang.as_deref())?,
    ))
}

async fn refresh(State(state): State<AppState>) -> ApiResult<Value> {
    let count = state.engine.refresh_templates()?;
    Ok(Json(json!({ "templates": count })))
}
