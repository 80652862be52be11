//! User directory and authentication

use hms_core::config::PasswordScheme;
use hms_core::types::{actions, Actor, Role, User};
use hms_core::{HmsError, HmsResult};
use hms_crypto::{hash_password_with, verify_password};
use rusqlite::{params, ErrorCode, OptionalExtension};

use crate::audit::append_entry;
use crate::{require_non_empty, Store};

/// Role recorded for attempts that never authenticated
pub const UNAUTHORIZED_ROLE: &str = "unauthorized";

impl Store {
    /// Create a user, hashing `password` with `scheme`.
    ///
    /// Usernames are unique and stored trimmed, the same way `login` looks
    /// them up.
    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        scheme: PasswordScheme,
    ) -> HmsResult<i64> {
        let username = username.trim();
        require_non_empty("username", username)?;
        require_non_empty("password", password)?;

        let digest = hash_password_with(password, scheme)?;
        let result = self.conn.execute(
            "INSERT INTO users (username, password, role) VALUES (?1, ?2, ?3)",
            params![username, digest, role.as_str()],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(HmsError::Validation(format!("username already exists: {username}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user_by_username(&self, username: &str) -> HmsResult<Option<User>> {
        let row: Option<(i64, String, String, String)> = self
            .conn
            .query_row(
                "SELECT user_id, username, password, role FROM users WHERE username = ?1",
                [username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(user_id, username, password_hash, role)| {
            Ok(User {
                user_id,
                username,
                password_hash,
                role: role.parse()?,
            })
        })
        .transpose()
    }

    /// Verify credentials and record the attempt.
    ///
    /// Returns `Ok(None)` for an unknown user or a wrong password; both are
    /// logged identically as `login_failed` so the trail does not reveal
    /// which usernames exist.
    pub fn login(&self, username: &str, password: &str) -> HmsResult<Option<User>> {
        let username = username.trim();
        let user = self
            .get_user_by_username(username)?
            .filter(|user| verify_password(password, &user.password_hash));

        match &user {
            Some(user) => {
                append_entry(
                    &self.conn,
                    &Actor::from(user),
                    actions::LOGIN,
                    "Successful authentication",
                    self.details_max_len,
                )?;
                tracing::info!(user_id = user.user_id, role = %user.role, "login succeeded");
            }
            None => {
                append_entry(
                    &self.conn,
                    &Actor::anonymous(UNAUTHORIZED_ROLE),
                    actions::LOGIN_FAILED,
                    &format!("username={username}"),
                    self.details_max_len,
                )?;
                tracing::warn!(username, "login failed");
            }
        }
        Ok(user)
    }

    pub fn logout(&self, user: &User) -> HmsResult<()> {
        append_entry(
            &self.conn,
            &Actor::from(user),
            actions::LOGOUT,
            "User initiated logout",
            self.details_max_len,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_store;

    #[test]
    fn test_create_and_get_user() {
        let store = memory_store();
        let id = store
            .create_user("Dr. Bob", "doc123", Role::Doctor, PasswordScheme::Sha256)
            .unwrap();

        let user = store.get_user_by_username("Dr. Bob").unwrap().unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role, Role::Doctor);
        assert_eq!(user.password_hash, hms_crypto::hash_password("doc123"));
        assert!(store.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn test_create_user_trims_username() {
        let store = memory_store();
        let id = store
            .create_user("  admin ", "admin123", Role::Admin, PasswordScheme::Sha256)
            .unwrap();

        assert_eq!(store.get_user_by_username("admin").unwrap().unwrap().user_id, id);
        assert_eq!(store.login("admin", "admin123").unwrap().unwrap().user_id, id);

        let err = store
            .create_user("admin", "other", Role::Doctor, PasswordScheme::Sha256)
            .unwrap_err();
        assert!(err.is_validation(), "trimmed names collide");
    }

    #[test]
    fn test_duplicate_username_is_validation_error() {
        let store = memory_store();
        store
            .create_user("admin", "a", Role::Admin, PasswordScheme::Sha256)
            .unwrap();
        let err = store
            .create_user("admin", "b", Role::Doctor, PasswordScheme::Sha256)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_login_success_is_audited() {
        let store = memory_store();
        let id = store
            .create_user("admin", "admin123", Role::Admin, PasswordScheme::Sha256)
            .unwrap();

        let user = store.login("  admin ", "admin123").unwrap().unwrap();
        assert_eq!(user.user_id, id);

        let entry = &store.list_actions(1).unwrap()[0];
        assert_eq!(entry.action, actions::LOGIN);
        assert_eq!(entry.user_id, Some(id));
        assert_eq!(entry.role, "admin");
    }

    #[test]
    fn test_login_failure_is_audited_without_actor() {
        let store = memory_store();
        store
            .create_user("admin", "admin123", Role::Admin, PasswordScheme::Sha256)
            .unwrap();

        assert!(store.login("admin", "wrong").unwrap().is_none());
        assert!(store.login("ghost", "admin123").unwrap().is_none());

        let entries = store.list_actions(10).unwrap();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.action, actions::LOGIN_FAILED);
            assert_eq!(entry.user_id, None);
            assert_eq!(entry.role, UNAUTHORIZED_ROLE);
        }
        assert_eq!(entries[0].details, "username=ghost");
    }

    #[test]
    fn test_login_with_argon2_user() {
        let store = memory_store();
        store
            .create_user("Alice_recep", "rec123", Role::Receptionist, PasswordScheme::Argon2id)
            .unwrap();

        let user = store.login("Alice_recep", "rec123").unwrap().unwrap();
        assert_eq!(user.role, Role::Receptionist);
        assert!(store.login("Alice_recep", "rec124").unwrap().is_none());
    }

    #[test]
    fn test_logout_is_audited() {
        let store = memory_store();
        store
            .create_user("admin", "admin123", Role::Admin, PasswordScheme::Sha256)
            .unwrap();
        let user = store.login("admin", "admin123").unwrap().unwrap();
        store.logout(&user).unwrap();

        assert_eq!(store.list_actions(1).unwrap()[0].action, actions::LOGOUT);
    }
}
