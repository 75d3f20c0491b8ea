//! Type-specific payloads stored in [`Confirmation::context`](crate::Confirmation).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Data-sharing permissions, e.g. `{"view": {}, "note": {}}`.
pub type Permissions = BTreeMap<String, serde_json::Value>;

/// `careteam_invitation`: permissions granted once the invitee accepts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CareTeamContext {
    #[serde(default)]
    pub permissions: Permissions,
}

/// `patient_clinic_invitation`: permissions the patient grants the clinic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientClinicContext {
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_code: Option<String>,
}

/// `patient_pin_reset`: the issued one-time password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinResetContext {
    pub timestamp: i64,
    pub otp: String,
}

/// `medicalteam_monitoring_invitation`: requested monitoring window.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_days: Option<u32>,
}

/// `notification`: server-issued topic with its raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub topic: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}
