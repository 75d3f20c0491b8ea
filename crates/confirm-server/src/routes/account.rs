//! Account-level flows: sign-up claim, password and PIN resets, information
//! mails, peer notifications and account events.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use confirm_core::Confirmation;
use serde_json::{Value, json};

use super::{ApiResult, JsonBody, OptionalJsonBody};
use crate::engine::{
    ConfirmationKey, NotificationRequest, PasswordResetAccept, SignupAccept,
};
use crate::middleware::{Auth, Language};
use crate::server::AppState;
use confirm_api::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send/signup/{user_id}", post(send_signup))
        .route("/resend/signup/{email}", post(resend_signup))
        .route("/accept/signup/{user_id}/{key}", put(accept_signup))
        .route("/dismiss/signup/{user_id}", put(dismiss_signup))
        .route("/signup/{user_id}", get(get_signup).delete(cancel_signup))
        .route("/send/forgot/{email}", post(send_forgot))
        .route("/accept/forgot", put(accept_forgot))
        .route("/send/pin-reset/{user_id}", post(send_pin_reset))
        .route("/send/inform/{user_id}", post(send_inform))
        .route("/sanity_check/{user_id}", post(sanity_check))
        .route("/notifications/{topic}", post(notify))
        .route("/events/user-deleted/{user_id}", post(user_deleted))
}

async fn send_signup(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(user_id): Path<String>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.send_signup(&caller, &user_id, &hint).await?,
    ))
}

async fn resend_signup(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(email): Path<String>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.resend_signup(&caller, &email, &hint).await?,
    ))
}

// The key in the path is the credential; no session is required.
async fn accept_signup(
    State(state): State<AppState>,
    Path((user_id, key)): Path<(String, String)>,
    OptionalJsonBody(body): OptionalJsonBody<SignupAccept>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.accept_signup(&user_id, &key, body).await?,
    ))
}

async fn dismiss_signup(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    OptionalJsonBody(body): OptionalJsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    let key = body.unwrap_or_default().key;
    Ok(Json(state.engine.dismiss_signup(&user_id, &key).await?))
}

async fn get_signup(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(user_id): Path<String>,
) -> ApiResult<Confirmation> {
    Ok(Json(state.engine.get_signup(&caller, &user_id).await?))
}

async fn cancel_signup(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Confirmation>> {
    Ok(Json(state.engine.cancel_signups(&caller, &user_id).await?))
}

async fn send_forgot(
    State(state): State<AppState>,
    Language(hint): Language,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.send_forgot(&email, &hint).await?;
    Ok(StatusCode::OK)
}

async fn accept_forgot(
    State(state): State<AppState>,
    JsonBody(accept): JsonBody<PasswordResetAccept>,
) -> ApiResult<Confirmation> {
    Ok(Json(state.engine.accept_forgot(accept).await?))
}

async fn send_pin_reset(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(user_id): Path<String>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.send_pin_reset(&caller, &user_id, &hint).await?,
    ))
}

async fn send_inform(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(user_id): Path<String>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.send_inform(&caller, &user_id, &hint).await?,
    ))
}

async fn sanity_check(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.sanity_check(&caller, &user_id, &hint).await?;
    Ok(StatusCode::OK)
}

async fn notify(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(topic): Path<String>,
    JsonBody(request): JsonBody<NotificationRequest>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .send_notification(&caller, &topic, request, &hint)
        .await?;
    Ok(Json(record))
}

async fn user_deleted(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(user_id): Path<String>,
) -> ApiResult<Value> {
    let removed = state.engine.user_deleted(&caller, &user_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
