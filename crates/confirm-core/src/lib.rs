pub mod context;
pub mod error;
pub mod expiry;
pub mod key;
pub mod model;
pub mod totp;

pub use context::{
    CareTeamContext, MonitoringContext, NotificationContext, PatientClinicContext,
    PinResetContext, Permissions,
};
pub use error::{CoreError, ErrorCategory, Result};
pub use expiry::ExpiryPolicy;
pub use key::{generate_key, validate_key, KEY_BYTES};
pub use model::{
    normalize_email, Confirmation, ConfirmationStatus, ConfirmationType, Creator, CreatorProfile,
    MemberRole, TeamRef,
};
pub use totp::{Totp, TotpValue};
