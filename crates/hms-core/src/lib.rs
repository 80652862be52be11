pub mod config;
pub mod error;
pub mod types;

pub use error::{HmsError, HmsResult};
pub use types::{
    actions, Actor, AuditEntry, DailyCount, PatientRecord, Role, SensitiveFields, User,
};
