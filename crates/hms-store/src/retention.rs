//! Advisory retention: flag records older than the configured window.
//!
//! Nothing here deletes. Removal stays an explicit, audited delete.

use chrono::{DateTime, NaiveDateTime, Utc};
use hms_core::config::RetentionConfig;
use hms_core::types::PatientRecord;

use crate::days_before;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub days: u32,
}

impl RetentionPolicy {
    pub fn new(days: u32) -> Self {
        Self { days }
    }

    /// Clamped to the earliest representable instant for very large windows.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_before(now, self.days)
    }

    /// A record whose `date_added` cannot be parsed is never flagged.
    pub fn is_stale(&self, record: &PatientRecord, now: DateTime<Utc>) -> bool {
        match record.date_added.parse::<NaiveDateTime>() {
            Ok(added) => added.and_utc() < self.cutoff(now),
            Err(e) => {
                tracing::debug!(patient_id = record.patient_id, "unparseable date_added: {e}");
                false
            }
        }
    }

    pub fn stale_records<'a>(
        &self,
        records: &'a [PatientRecord],
        now: DateTime<Utc>,
    ) -> Vec<&'a PatientRecord> {
        records.iter().filter(|r| self.is_stale(r, now)).collect()
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self::new(config.days)
    }
}
