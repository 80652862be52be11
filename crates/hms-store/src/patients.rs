//! Patient records: sealed fields with masks kept in lockstep
//!
//! On insert, masks are computed from the same values that were just sealed,
//! in the same transaction. Updates and refreshes re-derive them from a
//! decrypt of the stored ciphertext, so a mask always matches what a read
//! would return.

use hms_core::types::{actions, Actor, PatientRecord, SensitiveFields};
use hms_core::{HmsError, HmsResult};
use hms_crypto::{mask_contact, mask_identity, mask_text, FieldCipher};
use rusqlite::{params, Connection, OptionalExtension};

use crate::audit::append_entry;
use crate::{now_timestamp, require_non_empty, Store};

/// One row as stored: ciphertext plus masks
struct StoredPatient {
    patient_id: i64,
    name: String,
    contact: String,
    diagnosis: String,
    anonymized_name: Option<String>,
    anonymized_contact: Option<String>,
    anonymized_diagnosis: Option<String>,
    date_added: String,
}

const SELECT_PATIENT: &str = "SELECT patient_id, name, contact, diagnosis, \
     anonymized_name, anonymized_contact, anonymized_diagnosis, date_added FROM patients";

fn stored_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredPatient> {
    Ok(StoredPatient {
        patient_id: row.get(0)?,
        name: row.get(1)?,
        contact: row.get(2)?,
        diagnosis: row.get(3)?,
        anonymized_name: row.get(4)?,
        anonymized_contact: row.get(5)?,
        anonymized_diagnosis: row.get(6)?,
        date_added: row.get(7)?,
    })
}

impl StoredPatient {
    fn into_record(
        self,
        cipher: &FieldCipher,
        include_sensitive: bool,
    ) -> HmsResult<PatientRecord> {
        let sensitive = if include_sensitive {
            Some(SensitiveFields {
                name: cipher.open_str(&self.name)?,
                contact: cipher.open_str(&self.contact)?,
                diagnosis: cipher.open_str(&self.diagnosis)?,
            })
        } else {
            None
        };

        Ok(PatientRecord {
            patient_id: self.patient_id,
            anonymized_name: self.anonymized_name.unwrap_or_default(),
            anonymized_contact: self.anonymized_contact.unwrap_or_default(),
            anonymized_diagnosis: self.anonymized_diagnosis.unwrap_or_default(),
            date_added: self.date_added,
            sensitive,
        })
    }
}

fn ensure_exists(conn: &Connection, patient_id: i64) -> HmsResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT patient_id FROM patients WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )
        .optional()?;
    found
        .map(|_| ())
        .ok_or_else(|| HmsError::not_found("patient", patient_id))
}

/// Seal, insert, then mask using the assigned id. Caller owns the transaction.
fn insert_patient(
    conn: &Connection,
    cipher: &FieldCipher,
    name: &str,
    contact: &str,
    diagnosis: &str,
) -> HmsResult<i64> {
    require_non_empty("name", name)?;
    require_non_empty("contact", contact)?;
    require_non_empty("diagnosis", diagnosis)?;

    conn.execute(
        "INSERT INTO patients (name, contact, diagnosis, date_added) VALUES (?1, ?2, ?3, ?4)",
        params![
            cipher.seal_str(name)?,
            cipher.seal_str(contact)?,
            cipher.seal_str(diagnosis)?,
            now_timestamp(),
        ],
    )?;
    let patient_id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE patients
            SET anonymized_name = ?1,
                anonymized_contact = ?2,
                anonymized_diagnosis = ?3
          WHERE patient_id = ?4",
        params![
            mask_identity(patient_id),
            mask_contact(Some(contact)),
            mask_text(Some(diagnosis)),
            patient_id,
        ],
    )?;

    tracing::debug!(patient_id, "patient record sealed and masked");
    Ok(patient_id)
}

/// Reseal the given fields, then re-mask contact and diagnosis from the
/// stored values. Caller owns the transaction.
fn update_patient_fields(
    conn: &Connection,
    cipher: &FieldCipher,
    patient_id: i64,
    contact: Option<&str>,
    diagnosis: Option<&str>,
) -> HmsResult<()> {
    if let Some(contact) = contact {
        require_non_empty("contact", contact)?;
    }
    if let Some(diagnosis) = diagnosis {
        require_non_empty("diagnosis", diagnosis)?;
    }
    ensure_exists(conn, patient_id)?;

    if let Some(contact) = contact {
        conn.execute(
            "UPDATE patients SET contact = ?1 WHERE patient_id = ?2",
            params![cipher.seal_str(contact)?, patient_id],
        )?;
    }
    if let Some(diagnosis) = diagnosis {
        conn.execute(
            "UPDATE patients SET diagnosis = ?1 WHERE patient_id = ?2",
            params![cipher.seal_str(diagnosis)?, patient_id],
        )?;
    }

    remask_patient(conn, cipher, patient_id, false)
}

/// Recompute masks from the decrypted stored values.
///
/// `include_identity` also rewrites the id-derived name mask.
fn remask_patient(
    conn: &Connection,
    cipher: &FieldCipher,
    patient_id: i64,
    include_identity: bool,
) -> HmsResult<()> {
    let (sealed_contact, sealed_diagnosis): (String, String) = conn
        .query_row(
            "SELECT contact, diagnosis FROM patients WHERE patient_id = ?1",
            [patient_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| HmsError::not_found("patient", patient_id))?;

    let contact = cipher.open_str(&sealed_contact)?;
    let diagnosis = cipher.open_str(&sealed_diagnosis)?;

    if include_identity {
        conn.execute(
            "UPDATE patients
                SET anonymized_name = ?1,
                    anonymized_contact = ?2,
                    anonymized_diagnosis = ?3
              WHERE patient_id = ?4",
            params![
                mask_identity(patient_id),
                mask_contact(Some(&contact)),
                mask_text(Some(&diagnosis)),
                patient_id,
            ],
        )?;
    } else {
        conn.execute(
            "UPDATE patients
                SET anonymized_contact = ?1,
                    anonymized_diagnosis = ?2
              WHERE patient_id = ?3",
            params![mask_contact(Some(&contact)), mask_text(Some(&diagnosis)), patient_id],
        )?;
    }
    Ok(())
}

fn refresh_all(conn: &Connection, cipher: &FieldCipher) -> HmsResult<usize> {
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT patient_id FROM patients ORDER BY patient_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    for &patient_id in &ids {
        remask_patient(conn, cipher, patient_id, true)?;
    }
    Ok(ids.len())
}

/// Delete a record, returning its name mask for the audit trail.
fn delete_patient_row(conn: &Connection, patient_id: i64) -> HmsResult<Option<String>> {
    let anonymized_name: Option<Option<String>> = conn
        .query_row(
            "SELECT anonymized_name FROM patients WHERE patient_id = ?1",
            [patient_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(anonymized_name) = anonymized_name else {
        return Err(HmsError::not_found("patient", patient_id));
    };

    conn.execute("DELETE FROM patients WHERE patient_id = ?1", [patient_id])?;
    Ok(anonymized_name)
}

impl Store {
    /// Seal all three fields and store them with their masks. Returns the new id.
    pub fn create_patient(&mut self, name: &str, contact: &str, diagnosis: &str) -> HmsResult<i64> {
        let tx = self.conn.transaction()?;
        let patient_id = insert_patient(&tx, &self.cipher, name, contact, diagnosis)?;
        tx.commit()?;
        Ok(patient_id)
    }

    /// Replace contact and/or diagnosis. Both `None` is a no-op.
    pub fn update_patient(
        &mut self,
        patient_id: i64,
        contact: Option<&str>,
        diagnosis: Option<&str>,
    ) -> HmsResult<()> {
        if contact.is_none() && diagnosis.is_none() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        update_patient_fields(&tx, &self.cipher, patient_id, contact, diagnosis)?;
        tx.commit()?;
        Ok(())
    }

    /// All records, newest first.
    ///
    /// Decrypted fields are materialized only when `include_sensitive` is set.
    /// The flag is trusted; role checks belong to the caller.
    pub fn fetch_patients(&self, include_sensitive: bool) -> HmsResult<Vec<PatientRecord>> {
        let stored: Vec<StoredPatient> = {
            let mut stmt = self.conn.prepare(&format!(
                "{SELECT_PATIENT} ORDER BY date_added DESC, patient_id DESC"
            ))?;
            let rows = stmt.query_map([], stored_from_row)?;
            rows.collect::<Result<_, _>>()?
        };

        stored
            .into_iter()
            .map(|row| row.into_record(&self.cipher, include_sensitive))
            .collect()
    }

    pub fn get_patient(
        &self,
        patient_id: i64,
        include_sensitive: bool,
    ) -> HmsResult<PatientRecord> {
        let stored = self
            .conn
            .query_row(
                &format!("{SELECT_PATIENT} WHERE patient_id = ?1"),
                [patient_id],
                stored_from_row,
            )
            .optional()?
            .ok_or_else(|| HmsError::not_found("patient", patient_id))?;
        stored.into_record(&self.cipher, include_sensitive)
    }

    /// Hard delete. Audit entries mentioning the record are kept.
    pub fn delete_patient(&mut self, patient_id: i64) -> HmsResult<()> {
        let tx = self.conn.transaction()?;
        delete_patient_row(&tx, patient_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Recompute every mask from the decrypted stored values.
    ///
    /// Sealed columns are only read. Safe to run repeatedly. Returns the
    /// number of records refreshed.
    pub fn refresh_anonymized_fields(&mut self) -> HmsResult<usize> {
        let tx = self.conn.transaction()?;
        let refreshed = refresh_all(&tx, &self.cipher)?;
        tx.commit()?;
        tracing::info!(refreshed, "anonymized fields refreshed");
        Ok(refreshed)
    }

    pub fn patient_count(&self) -> HmsResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Audited variants: mutation and audit entry commit together ──────────

    pub fn create_patient_as(
        &mut self,
        actor: &Actor,
        name: &str,
        contact: &str,
        diagnosis: &str,
    ) -> HmsResult<i64> {
        let tx = self.conn.transaction()?;
        let patient_id = insert_patient(&tx, &self.cipher, name, contact, diagnosis)?;
        append_entry(
            &tx,
            actor,
            actions::ADD_PATIENT,
            &format!("patient_id={patient_id}"),
            self.details_max_len,
        )?;
        tx.commit()?;
        Ok(patient_id)
    }

    pub fn update_patient_as(
        &mut self,
        actor: &Actor,
        patient_id: i64,
        contact: Option<&str>,
        diagnosis: Option<&str>,
    ) -> HmsResult<()> {
        if contact.is_none() && diagnosis.is_none() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        update_patient_fields(&tx, &self.cipher, patient_id, contact, diagnosis)?;
        append_entry(
            &tx,
            actor,
            actions::UPDATE_PATIENT,
            &format!("patient_id={patient_id}"),
            self.details_max_len,
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_patient_as(&mut self, actor: &Actor, patient_id: i64) -> HmsResult<()> {
        let tx = self.conn.transaction()?;
        let anonymized_name = delete_patient_row(&tx, patient_id)?;
        let details = match anonymized_name {
            Some(mask) => format!("patient_id={patient_id}, anonymized_name={mask}"),
            None => format!("patient_id={patient_id}"),
        };
        append_entry(&tx, actor, actions::DELETE_PATIENT, &details, self.details_max_len)?;
        tx.commit()?;
        Ok(())
    }

    pub fn refresh_anonymized_fields_as(&mut self, actor: &Actor) -> HmsResult<usize> {
        let tx = self.conn.transaction()?;
        let refreshed = refresh_all(&tx, &self.cipher)?;
        append_entry(
            &tx,
            actor,
            actions::REANONYMIZE,
            "Full refresh triggered",
            self.details_max_len,
        )?;
        tx.commit()?;
        tracing::info!(refreshed, "anonymized fields refreshed");
        Ok(refreshed)
    }
}
