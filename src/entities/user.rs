// 👤 User Entity - the local record of an authenticated identity

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::db::parse_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub const COLUMNS: &'static str = "id, email, name, avatar_url, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
        let created_at: String = row.get(4)?;

        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            avatar_url: row.get(3)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// Profile data supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl NewUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        NewUser {
            id: id.into(),
            email: email.into(),
            name: None,
            avatar_url: None,
        }
    }

    /// Name to store: the given one, else the local part of the email.
    pub fn effective_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self
                .email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_name_defaults_to_email_local_part() {
        let user = NewUser::new("u1", "ada@example.com");
        assert_eq!(user.effective_name(), "ada");

        let named = NewUser {
            name: Some("Ada Lovelace".to_string()),
            ..NewUser::new("u1", "ada@example.com")
        };
        assert_eq!(named.effective_name(), "Ada Lovelace");
    }
}
