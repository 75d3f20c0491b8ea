use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post, put},
};
use confirm_core::Confirmation;

use super::{ApiResult, JsonBody, OptionalJsonBody};
use crate::engine::{ConfirmationKey, MonitoringInvite, RoleChange, TeamInvite};
use crate::middleware::{Auth, Language};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send/team/invite", post(send_invite))
        .route("/accept/team/invite", put(accept_invite))
        .route("/dismiss/team/invite/{team_id}", put(dismiss_invite))
        .route("/send/team/role/{user_id}", put(change_role))
        .route("/send/team/leave/{team_id}/{user_id}", delete(remove_member))
        .route("/team/{team_id}/invites", get(team_invites))
        .route(
            "/send/team/monitoring/{team_id}/{user_id}",
            post(send_monitoring),
        )
        .route(
            "/accept/team/monitoring/{team_id}/{user_id}",
            put(accept_monitoring),
        )
        .route(
            "/dismiss/team/monitoring/{team_id}/{user_id}",
            put(dismiss_monitoring),
        )
}

async fn send_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    JsonBody(invite): JsonBody<TeamInvite>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.send_team_invite(&caller, invite, &hint).await?,
    ))
}

async fn accept_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    JsonBody(body): JsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state.engine.accept_team_invite(&caller, &body.key).await?,
    ))
}

/// 304 when the record is already closed.
async fn dismiss_invite(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(team_id): Path<String>,
    JsonBody(body): JsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .dismiss_team_invite(&caller, &team_id, &body.key)
            .await?,
    ))
}

async fn change_role(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(user_id): Path<String>,
    JsonBody(change): JsonBody<RoleChange>,
) -> ApiResult<Option<Confirmation>> {
    Ok(Json(
        state
            .engine
            .change_member_role(&caller, &user_id, change, &hint)
            .await?,
    ))
}

async fn remove_member(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path((team_id, user_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .remove_member(&caller, &team_id, &user_id, &hint)
            .await?,
    ))
}

async fn team_invites(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(team_id): Path<String>,
) -> ApiResult<Vec<Confirmation>> {
    Ok(Json(state.engine.list_team_invites(&caller, &team_id).await?))
}

async fn send_monitoring(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path((team_id, user_id)): Path<(String, String)>,
    OptionalJsonBody(invite): OptionalJsonBody<MonitoringInvite>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .send_monitoring_invite(&caller, &team_id, &user_id, invite.unwrap_or_default(), &hint)
            .await?,
    ))
}

async fn accept_monitoring(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((team_id, user_id)): Path<(String, String)>,
    OptionalJsonBody(body): OptionalJsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    let key = body.map(|b| b.key).filter(|k| !k.is_empty());
    Ok(Json(
        state
            .engine
            .accept_monitoring_invite(&caller, &team_id, &user_id, key.as_deref())
            .await?,
    ))
}

async fn dismiss_monitoring(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((team_id, user_id)): Path<(String, String)>,
    OptionalJsonBody(body): OptionalJsonBody<ConfirmationKey>,
) -> ApiResult<Confirmation> {
    let key = body.map(|b| b.key).filter(|k| !k.is_empty());
    Ok(Json(
        state
            .engine
            .dismiss_monitoring_invite(&caller, &team_id, &user_id, key.as_deref())
            .await?,
    ))
}
