// 🧳 Trip Entity - owns an ordered collection of pins
//
// The owner is `user_id`; other users reach a trip through
// `trip_collaborators` rows.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::db::{parse_date, parse_timestamp};

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "owner" => Some(Role::Owner),
            "editor" => Some(Role::Editor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    /// Owners and editors may change the trip and its pins. Any member,
    /// viewers included, may invite others.
    pub fn can_edit(&self) -> bool {
        matches!(self, Role::Owner | Role::Editor)
    }
}

// ============================================================================
// TRIP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub const COLUMNS: &'static str = "id, user_id, name, start_date, end_date, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Trip> {
        let start_date: Option<String> = row.get(3)?;
        let end_date: Option<String> = row.get(4)?;
        let created_at: String = row.get(5)?;

        Ok(Trip {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            start_date: start_date.as_deref().map(parse_date).transpose()?,
            end_date: end_date.as_deref().map(parse_date).transpose()?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    /// Human readable date range, e.g. "Mar 1, 2025 – Mar 5, 2025".
    pub fn date_range_label(&self) -> String {
        format_date_range(self.start_date, self.end_date)
    }
}

pub fn format_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    const FMT: &str = "%b %-d, %Y";
    match (start, end) {
        (Some(s), Some(e)) if s == e => s.format(FMT).to_string(),
        (Some(s), Some(e)) => format!("{} – {}", s.format(FMT), e.format(FMT)),
        (Some(s), None) => format!("Starts {}", s.format(FMT)),
        (None, Some(e)) => format!("Ends {}", e.format(FMT)),
        (None, None) => "No dates set".to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTrip {
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl NewTrip {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("trip name is required".to_string());
        }
        validate_dates(self.start_date, self.end_date)
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl TripUpdate {
    /// Apply onto an existing trip, returning the validated result.
    pub fn apply(&self, trip: &Trip) -> Result<Trip, String> {
        let mut next = trip.clone();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("trip name is required".to_string());
            }
            next.name = name.trim().to_string();
        }
        if self.start_date.is_some() {
            next.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            next.end_date = self.end_date;
        }
        validate_dates(next.start_date, next.end_date)?;
        Ok(next)
    }
}

fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err("start date cannot be after end date".to_string()),
        _ => Ok(()),
    }
}

// ============================================================================
// COLLABORATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub trip_id: String,
    pub user_id: String,
    pub role: Role,
    pub created_by: Option<String>,
    pub invitation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Collaborator {
    pub const COLUMNS: &'static str =
        "id, trip_id, user_id, role, created_by, invitation_id, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Collaborator> {
        let role: String = row.get(3)?;
        let created_at: String = row.get(6)?;

        Ok(Collaborator {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            user_id: row.get(2)?,
            // Unknown roles degrade to read-only
            role: Role::parse(&role).unwrap_or(Role::Viewer),
            created_by: row.get(4)?,
            invitation_id: row.get(5)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_label() {
        assert_eq!(
            format_date_range(Some(date(2025, 3, 1)), Some(date(2025, 3, 5))),
            "Mar 1, 2025 – Mar 5, 2025"
        );
        assert_eq!(
            format_date_range(Some(date(2025, 3, 1)), Some(date(2025, 3, 1))),
            "Mar 1, 2025"
        );
        assert_eq!(format_date_range(Some(date(2025, 12, 24)), None), "Starts Dec 24, 2025");
        assert_eq!(format_date_range(None, Some(date(2026, 1, 2))), "Ends Jan 2, 2026");
        assert_eq!(format_date_range(None, None), "No dates set");
    }

    #[test]
    fn test_new_trip_validation() {
        let trip = NewTrip {
            name: "Lisbon".to_string(),
            start_date: Some(date(2025, 5, 10)),
            end_date: Some(date(2025, 5, 1)),
        };
        assert_eq!(trip.validate().unwrap_err(), "start date cannot be after end date");

        let unnamed = NewTrip::default();
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_trip_update_apply() {
        let trip = Trip {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            name: "Old".to_string(),
            start_date: Some(date(2025, 1, 1)),
            end_date: None,
            created_at: Utc::now(),
        };

        let update = TripUpdate {
            name: Some("  New  ".to_string()),
            end_date: Some(date(2025, 1, 9)),
            ..Default::default()
        };
        let next = update.apply(&trip).unwrap();
        assert_eq!(next.name, "New");
        assert_eq!(next.start_date, Some(date(2025, 1, 1)));
        assert_eq!(next.end_date, Some(date(2025, 1, 9)));

        let bad = TripUpdate {
            end_date: Some(date(2024, 12, 31)),
            ..Default::default()
        };
        assert!(bad.apply(&trip).is_err());
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Owner.can_edit());
        assert!(Role::Editor.can_edit());
        assert!(!Role::Viewer.can_edit());
        assert_eq!(Role::parse("editor"), Some(Role::Editor));
        assert_eq!(Role::parse("admin"), None);
    }
}
