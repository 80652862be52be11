use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HmsError;

/// Authorization role. The sole axis of access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Receptionist,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Doctor, Role::Receptionist];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Receptionist => "receptionist",
        }
    }

    /// Decrypted name/contact/diagnosis may be materialized
    pub fn can_view_sensitive(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Intake, update and delete of patient records
    pub fn can_edit_patients(&self) -> bool {
        matches!(self, Role::Admin | Role::Receptionist)
    }

    /// Audit trail review, mask refresh
    pub fn can_view_audit(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(HmsError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// A stored user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    /// SHA-256 hex digest or Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
}

/// Identity an audited action is attributed to.
///
/// `user_id` is `None` for unauthenticated attempts; `role` is free text so
/// those can be recorded as e.g. "unauthorized".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub role: String,
}

impl Actor {
    pub fn anonymous(role: impl Into<String>) -> Self {
        Self {
            user_id: None,
            role: role.into(),
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            user_id: Some(user.user_id),
            role: user.role.as_str().to_string(),
        }
    }
}

/// Decrypted sensitive fields, present only on privileged reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveFields {
    pub name: String,
    pub contact: String,
    pub diagnosis: String,
}

/// A patient record as returned to callers.
///
/// Masks and metadata are always present. `sensitive` is `Some` only when the
/// caller explicitly asked for decrypted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: i64,
    pub anonymized_name: String,
    pub anonymized_contact: String,
    pub anonymized_diagnosis: String,
    /// UTC, `YYYY-MM-DDTHH:MM:SS.ffffff`
    pub date_added: String,
    #[serde(flatten)]
    pub sensitive: Option<SensitiveFields>,
}

/// One immutable row of the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub log_id: i64,
    pub user_id: Option<i64>,
    pub role: String,
    pub action: String,
    /// UTC, `YYYY-MM-DDTHH:MM:SS.ffffff`
    pub timestamp: String,
    pub details: String,
}

/// Audit activity aggregated per calendar day (UTC)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// `YYYY-MM-DD`
    pub day: String,
    pub total: u64,
}

/// Action names written to the audit trail
pub mod actions {
    pub const LOGIN: &str = "login";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGOUT: &str = "logout";
    pub const ADD_PATIENT: &str = "add_patient";
    pub const UPDATE_PATIENT: &str = "update_patient";
    pub const DELETE_PATIENT: &str = "delete_patient";
    pub const REANONYMIZE: &str = "reanonymize";
    pub const VIEW_PATIENTS: &str = "view_patients";
    pub const VIEW_LOGS: &str = "view_logs";
}
