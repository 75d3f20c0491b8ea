use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use confirm_core::Confirmation;

use super::{ApiResult, JsonBody};
use crate::engine::{CareTeamInvite, ConfirmationKey};
use crate::middleware::{Auth, Language};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send/invite/{user_id}", post(send_invite))
        .route("/invitations/{user_id}", get(received))
        .route("/invite/{user_id}", get(sent))
        .route("/accept/invite/{user_id}/{invited_by}", put(accept_invite))
        .route("/dismiss/invite/{user_id}/{invited_by}", put(dismiss_invite))
        .route("/{user_id}/invited/{email}", put(cancel_invite))
}

async fn send_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(user_id): Path<String>,
    JsonBody(invite): JsonBody<CareTeamInvite>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .send_careteam_invite(&caller, &user_id, invite, &hint)
        .await?;
    Ok(Json(record))
}

async fn received(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Confirmation>> {
    Ok(Json(
        state.engine.received_invitations(&caller, &user_id).await?,
    ))
}

async fn sent(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<Confirmation>> {
    Ok(Json(state.engine.sent_invitations(&caller, &user_id).await?))
}

async fn accept_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((user_id, invited_by)): Path<(String, String)>,
    JsonBody(body): JsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .accept_careteam_invite(&caller, &user_id, &invited_by, &body.key)
        .await?;
    Ok(Json(record))
}

async fn dismiss_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((user_id, invited_by)): Path<(String, String)>,
    JsonBody(body): JsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .dismiss_careteam_invite(&caller, &user_id, &invited_by, &body.key)
        .await?;
    Ok(Json(record))
}

async fn cancel_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((user_id, email)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .cancel_careteam_invite(&caller, &user_id, &email)
        .await?;
    Ok(Json(record))
}
