// ✉️ Invitation Entity - a time-limited token granting collaborator access

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::db::parse_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub trip_id: String,
    pub invited_by: String,
    pub invitation_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    pub const COLUMNS: &'static str =
        "id, trip_id, invited_by, invitation_token, expires_at, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Invitation> {
        let expires_at: String = row.get(4)?;
        let created_at: String = row.get(5)?;

        Ok(Invitation {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            invited_by: row.get(2)?,
            invitation_token: row.get(3)?,
            expires_at: parse_timestamp(&expires_at)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    /// An invitation is usable strictly before its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let invitation = Invitation {
            id: "i1".to_string(),
            trip_id: "t1".to_string(),
            invited_by: "u1".to_string(),
            invitation_token: "tok".to_string(),
            expires_at: now,
            created_at: now - Duration::hours(24),
        };

        assert!(!invitation.is_expired_at(now - Duration::seconds(1)));
        assert!(invitation.is_expired_at(now));
        assert!(invitation.is_expired_at(now + Duration::seconds(1)));
    }
}
