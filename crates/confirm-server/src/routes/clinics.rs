use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post, put},
};
use confirm_core::Confirmation;

use super::{ApiResult, JsonBody};
use crate::engine::{ClinicianInvite, PatientClinicInvite};
use crate::middleware::{Auth, Language};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clinics/{clinic_id}/invite/patient", post(invite_patient))
        .route("/clinics/{clinic_id}/invites/patients", get(patient_invites))
        .route(
            "/clinics/{clinic_id}/invites/patients/{invite_id}",
            put(accept_patient).delete(decline_patient),
        )
        .route("/clinics/{clinic_id}/invite/clinician", post(invite_clinician))
        .route("/clinics/{clinic_id}/invites/clinicians", get(clinician_invites))
        .route(
            "/clinics/{clinic_id}/invites/{invite_id}/clinician",
            put(accept_clinician).delete(cancel_clinician),
        )
        .route(
            "/clinics/{clinic_id}/invites/{invite_id}/clinician/resend",
            post(resend_clinician),
        )
        .route(
            "/clinics/{clinic_id}/invites/{invite_id}/clinician/dismiss",
            put(dismiss_clinician),
        )
}

async fn invite_patient(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(clinic_id): Path<String>,
    JsonBody(invite): JsonBody<PatientClinicInvite>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .send_patient_clinic_invite(&caller, &clinic_id, invite, &hint)
        .await?;
    Ok(Json(record))
}

async fn patient_invites(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(clinic_id): Path<String>,
) -> ApiResult<Vec<Confirmation>> {
    Ok(Json(
        state
            .engine
            .list_patient_clinic_invites(&caller, &clinic_id)
            .await?,
    ))
}

async fn accept_patient(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((clinic_id, invite_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .accept_patient_clinic_invite(&caller, &clinic_id, &invite_id)
            .await?,
    ))
}

async fn decline_patient(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((clinic_id, invite_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .decline_patient_clinic_invite(&caller, &clinic_id, &invite_id)
            .await?,
    ))
}

async fn invite_clinician(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path(clinic_id): Path<String>,
    JsonBody(invite): JsonBody<ClinicianInvite>,
) -> ApiResult<Confirmation> {
    let record = state
        .engine
        .send_clinician_invite(&caller, &clinic_id, invite, &hint)
        .await?;
    Ok(Json(record))
}

async fn clinician_invites(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path(clinic_id): Path<String>,
) -> ApiResult<Vec<Confirmation>> {
    Ok(Json(
        state.engine.list_clinician_invites(&caller, &clinic_id).await?,
    ))
}

async fn accept_clinician(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((clinic_id, invite_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .accept_clinician_invite(&caller, &clinic_id, &invite_id)
            .await?,
    ))
}

async fn resend_clinician(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Language(hint): Language,
    Path((clinic_id, invite_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .resend_clinician_invite(&caller, &clinic_id, &invite_id, &hint)
            .await?,
    ))
}

async fn dismiss_clinician(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((clinic_id, invite_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .dismiss_clinician_invite(&caller, &clinic_id, &invite_id)
            .await?,
    ))
}

async fn cancel_clinician(
    State(state): State<AppState>,
    Auth(caller): Auth,
    Path((clinic_id, invite_id)): Path<(String, String)>,
) -> ApiResult<Confirmation> {
    Ok(Json(
        state
            .engine
            .cancel_clinician_invite(&caller, &clinic_id, &invite_id)
            .await?,
    ))
}
