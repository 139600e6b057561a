// Session / identity.
//
// Authentication itself happens elsewhere; by the time a request reaches
// this crate the caller has an authenticated user id. A `Session` is the
// explicit context handed to every operation instead of a global auth state.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::{format_timestamp, record_event};
use crate::entities::{NewUser, User};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Session { user: None }
    }

    pub fn signed_in(user: User) -> Self {
        Session { user: Some(user) }
    }

    pub fn current_user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> StoreResult<&User> {
        self.user.as_ref().ok_or(StoreError::Unauthenticated)
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn sign_out(&mut self) {
        if let Some(user) = self.user.take() {
            info!(user_id = %user.id, "signed out");
        }
    }
}

/// Resolve an already-authenticated user id into a session.
/// Unknown or missing ids yield an anonymous session.
pub fn resolve_session(conn: &Connection, user_id: Option<&str>) -> StoreResult<Session> {
    let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(Session::anonymous());
    };

    match get_user(conn, user_id)? {
        Some(user) => Ok(Session::signed_in(user)),
        None => {
            debug!(user_id, "no user record for bearer id");
            Ok(Session::anonymous())
        }
    }
}

pub fn get_user(conn: &Connection, user_id: &str) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS);
    let user = conn
        .query_row(&sql, params![user_id], User::from_row)
        .optional()?;
    Ok(user)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnsureUser {
    Existed,
    Created,
}

/// Make sure a `users` row exists for this identity. Idempotent, and safe
/// against a concurrent insert of the same id.
pub fn ensure_user_exists(conn: &Connection, new_user: &NewUser) -> StoreResult<EnsureUser> {
    if new_user.id.trim().is_empty() || new_user.email.trim().is_empty() {
        return Err(StoreError::Invalid("user id and email are required".to_string()));
    }

    if get_user(conn, &new_user.id)?.is_some() {
        return Ok(EnsureUser::Existed);
    }

    let result = conn.execute(
        "INSERT INTO users (id, email, name, avatar_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new_user.id,
            new_user.email,
            new_user.effective_name(),
            new_user.avatar_url,
            format_timestamp(Utc::now()),
        ],
    );

    match result {
        Ok(_) => {
            record_event(
                conn,
                "user_created",
                "user",
                &new_user.id,
                serde_json::json!({ "email": new_user.email }),
                &new_user.id,
            )?;
            info!(user_id = %new_user.id, "user record created");
            Ok(EnsureUser::Created)
        }
        // Someone else created the row between our check and insert
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            if get_user(conn, &new_user.id)?.is_some() {
                Ok(EnsureUser::Existed)
            } else {
                Err(StoreError::Conflict(format!(
                    "email already registered: {}",
                    new_user.email
                )))
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_ensure_user_exists_is_idempotent() {
        let conn = test_conn();
        let user = NewUser::new("u1", "ada@example.com");

        assert_eq!(ensure_user_exists(&conn, &user).unwrap(), EnsureUser::Created);
        assert_eq!(ensure_user_exists(&conn, &user).unwrap(), EnsureUser::Existed);

        let stored = get_user(&conn, "u1").unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("ada"));
        assert_eq!(stored.display_name(), "ada");
    }

    #[test]
    fn test_duplicate_email_under_new_id_conflicts() {
        let conn = test_conn();
        ensure_user_exists(&conn, &NewUser::new("u1", "ada@example.com")).unwrap();

        let err = ensure_user_exists(&conn, &NewUser::new("u2", "ada@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_resolve_session() {
        let conn = test_conn();
        ensure_user_exists(&conn, &NewUser::new("u1", "ada@example.com")).unwrap();

        let session = resolve_session(&conn, Some("u1")).unwrap();
        assert_eq!(session.current_user().map(|u| u.id.as_str()), Some("u1"));

        assert!(!resolve_session(&conn, Some("ghost")).unwrap().is_signed_in());
        assert!(!resolve_session(&conn, None).unwrap().is_signed_in());
        assert!(!resolve_session(&conn, Some("  ")).unwrap().is_signed_in());
    }

    #[test]
    fn test_sign_out_clears_user() {
        let conn = test_conn();
        ensure_user_exists(&conn, &NewUser::new("u1", "ada@example.com")).unwrap();
        let mut session = resolve_session(&conn, Some("u1")).unwrap();

        session.sign_out();

        assert!(session.current_user().is_none());
        assert!(matches!(session.require_user(), Err(StoreError::Unauthenticated)));
    }
}
