//! HTTP routes.
//!
//! Organized by flow:
//! - `careteam` - invitations between end users, received and sent listings
//! - `account` - sign-up, password and PIN resets, information mails, events
//! - `clinics` - patient to clinic and clinician invitations
//! - `teams` - medical-team invitations, monitoring, role changes
//! - `preview` - template preview, mounted only in preview mode

pub mod account;
pub mod careteam;
pub mod clinics;
pub mod preview;
pub mod teams;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use confirm_api::ApiError;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::server::AppState;

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(preview: bool) -> Router<AppState> {
    let router = Router::new()
        .route("/status", get(status))
        .merge(careteam::router())
        .merge(account::router())
        .merge(clinics::router())
        .merge(teams::router());
    if preview {
        tracing::info!("Template preview routes enabled");
        router.merge(preview::router())
    } else {
        router
    }
}

async fn status(State(state): State<AppState>) -> Response {
    match state.engine.status().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Status check failed");
            ApiError::internal(e.to_string()).into_response()
        }
    }
}

/// JSON request body; malformed input is rejected with the service's error body.
pub struct JsonBody<T>(pub T);

/// Like [`JsonBody`], but an empty body yields `None`.
pub struct OptionalJsonBody<T>(pub Option<T>);

async fn body_bytes<S: Send + Sync>(req: Request, state: &S) -> Result<Bytes, Response> {
    Bytes::from_request(req, state)
        .await
        .map_err(IntoResponse::into_response)
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")).into_response())
}

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = body_bytes(req, state).await?;
        parse(&bytes).map(JsonBody)
    }
}

impl<S, T> FromRequest<S> for OptionalJsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = body_bytes(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJsonBody(None));
        }
        parse(&bytes).map(|v| OptionalJsonBody(Some(v)))
    }
}
