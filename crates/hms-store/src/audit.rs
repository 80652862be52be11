//! Append-only audit trail
//!
//! Rows are only ever inserted. No operation in this crate updates or
//! deletes from `logs`.

use chrono::Utc;
use hms_core::types::{Actor, AuditEntry, DailyCount};
use hms_core::HmsResult;
use rusqlite::{params, Connection};

use crate::{days_before, now_timestamp, require_non_empty, Store, TIMESTAMP_FORMAT};

/// Keep at most `max_chars` characters (not bytes).
pub fn truncate_details(details: &str, max_chars: usize) -> String {
    match details.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => details[..byte_idx].to_string(),
        None => details.to_string(),
    }
}

pub(crate) fn append_entry(
    conn: &Connection,
    actor: &Actor,
    action: &str,
    details: &str,
    details_max_len: usize,
) -> HmsResult<i64> {
    require_non_empty("role", &actor.role)?;
    require_non_empty("action", action)?;

    conn.execute(
        "INSERT INTO logs (user_id, role, action, timestamp, details) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            actor.user_id,
            actor.role,
            action,
            now_timestamp(),
            truncate_details(details, details_max_len),
        ],
    )?;
    let log_id = conn.last_insert_rowid();
    tracing::debug!(
        log_id,
        user_id = ?actor.user_id,
        role = %actor.role,
        action,
        "audit entry appended"
    );
    Ok(log_id)
}

impl Store {
    /// Append one audit entry. Details longer than the configured maximum
    /// are truncated, not rejected.
    pub fn record_action(
        &self,
        actor_id: Option<i64>,
        role: &str,
        action: &str,
        details: &str,
    ) -> HmsResult<()> {
        let actor = Actor {
            user_id: actor_id,
            role: role.to_string(),
        };
        append_entry(&self.conn, &actor, action, details, self.details_max_len)?;
        Ok(())
    }

    /// Most recent entries first, at most `limit`.
    pub fn list_actions(&self, limit: usize) -> HmsResult<Vec<AuditEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT log_id, user_id, role, action, timestamp, details
               FROM logs
              ORDER BY timestamp DESC, log_id DESC
              LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(AuditEntry {
                log_id: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get(2)?,
                action: row.get(3)?,
                timestamp: row.get(4)?,
                details: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?;
        let entries: Vec<AuditEntry> = rows.collect::<Result<_, _>>()?;
        Ok(entries)
    }

    /// Entry counts per UTC day over the trailing `window_days`, oldest day first.
    pub fn counts_by_day(&self, window_days: u32) -> HmsResult<Vec<DailyCount>> {
        // An out-of-range window clamps to the earliest instant and so covers
        // every entry.
        let cutoff = days_before(Utc::now(), window_days)
            .format(TIMESTAMP_FORMAT)
            .to_string();

        let mut stmt = self.conn.prepare(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*) AS total
               FROM logs
              WHERE timestamp >= ?1
              GROUP BY day
              ORDER BY day",
        )?;
        let rows = stmt.query_map([cutoff], |row| {
            Ok(DailyCount {
                day: row.get(0)?,
                total: row.get::<_, i64>(1)? as u64,
            })
        })?;
        let counts: Vec<DailyCount> = rows.collect::<Result<_, _>>()?;
        Ok(counts)
    }
}
