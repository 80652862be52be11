//! Demo accounts and records for a fresh database

use hms_core::config::PasswordScheme;
use hms_core::types::Role;
use hms_core::HmsResult;
use hms_crypto::hash_password_with;
use rusqlite::params;

use crate::Store;

/// (username, password, role)
pub const DEMO_USERS: [(&str, &str, Role); 3] = [
    ("admin", "admin123", Role::Admin),
    ("Dr. Bob", "doc123", Role::Doctor),
    ("Alice_recep", "rec123", Role::Receptionist),
];

/// (name, contact, diagnosis)
pub const DEMO_PATIENTS: [(&str, &str, &str); 5] = [
    ("Fatima Khan", "+92-300-1234567", "Hypertension"),
    ("Ahmed Hassan", "+92-321-5678901", "Type 2 Diabetes"),
    ("Zainab Malik", "+92-333-9876543", "Asthma"),
    ("Muhammad Ali", "+92-345-2468135", "Seasonal Allergies"),
    ("Pervaiz Ahmed", "+92-312-3691357", "Migraine"),
];

impl Store {
    /// Insert the demo accounts, skipping usernames that already exist.
    /// Returns how many were inserted.
    pub fn seed_users(&self, scheme: PasswordScheme) -> HmsResult<usize> {
        let mut inserted = 0;
        for (username, password, role) in DEMO_USERS {
            let digest = hash_password_with(password, scheme)?;
            inserted += self.conn.execute(
                "INSERT OR IGNORE INTO users (username, password, role) VALUES (?1, ?2, ?3)",
                params![username, digest, role.as_str()],
            )?;
        }
        Ok(inserted)
    }

    /// Insert the demo patients, but only into an empty table.
    pub fn seed_patients(&mut self) -> HmsResult<usize> {
        if self.patient_count()? > 0 {
            return Ok(0);
        }
        for (name, contact, diagnosis) in DEMO_PATIENTS {
            self.create_patient(name, contact, diagnosis)?;
        }
        Ok(DEMO_PATIENTS.len())
    }

    /// Schema is applied on open; this optionally seeds demo data on top.
    pub fn init_db(&mut self, seed: bool, scheme: PasswordScheme) -> HmsResult<()> {
        if !seed {
            return Ok(());
        }
        let users = self.seed_users(scheme)?;
        let patients = self.seed_patients()?;
        tracing::info!(users, patients, "seeded demo data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;

    #[test]
    fn test_init_db_seeds_once() {
        let mut store = memory_store();
        store.init_db(true, PasswordScheme::Sha256).unwrap();
        store.init_db(true, PasswordScheme::Sha256).unwrap();

        assert_eq!(store.patient_count().unwrap(), 5);
        for (username, _, role) in DEMO_USERS {
            let user = store.get_user_by_username(username).unwrap().unwrap();
            assert_eq!(user.role, role);
        }
    }

    #[test]
    fn test_init_db_without_seed_leaves_tables_empty() {
        let mut store = memory_store();
        store.init_db(false, PasswordScheme::Sha256).unwrap();
        assert_eq!(store.patient_count().unwrap(), 0);
        assert!(store.get_user_by_username("admin").unwrap().is_none());
    }

    #[test]
    fn test_seed_patients_skips_non_empty_table() {
        let mut store = memory_store();
        store.create_patient("Someone", "555-0100", "Flu").unwrap();
        assert_eq!(store.seed_patients().unwrap(), 0);
        assert_eq!(store.patient_count().unwrap(), 1);
    }

    #[test]
    fn test_seeded_users_can_log_in() {
        let store = memory_store();
        store.seed_users(PasswordScheme::Sha256).unwrap();
        let user = store.login("Dr. Bob", "doc123").unwrap().unwrap();
        assert_eq!(user.role, Role::Doctor);
    }

    #[test]
    fn test_seeded_patient_masks() {
        let mut store = memory_store();
        store.seed_patients().unwrap();

        let records = store.fetch_patients(false).unwrap();
        let ahmed = records
            .iter()
            .find(|r| r.anonymized_contact == "XXX-XXX-8901")
            .unwrap();
        assert_eq!(ahmed.anonymized_diagnosis, "TYP***");
        assert_eq!(ahmed.anonymized_name, format!("ANON_{:04}", ahmed.patient_id));
        assert!(ahmed.sensitive.is_none());
    }
}
