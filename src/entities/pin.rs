// 📍 Pin Entity - a map location inside a trip
//
// `order` is the pin's zero-based position within its trip. The set of
// orders for one trip is always 0..N-1 at rest.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::db::parse_timestamp;

// ============================================================================
// PIN CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinCategory {
    Attraction,
    Restaurant,
    Hotel,
    Museum,
    Bar,
    Park,
    Transportation,
    Shopping,
    Entertainment,
    Other,
}

/// Marker colour for pins without a (known) category.
pub const DEFAULT_MARKER_COLOR: &str = "#757575";

impl PinCategory {
    pub const ALL: [PinCategory; 10] = [
        PinCategory::Attraction,
        PinCategory::Restaurant,
        PinCategory::Hotel,
        PinCategory::Museum,
        PinCategory::Bar,
        PinCategory::Park,
        PinCategory::Transportation,
        PinCategory::Shopping,
        PinCategory::Entertainment,
        PinCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PinCategory::Attraction => "Attraction",
            PinCategory::Restaurant => "Restaurant",
            PinCategory::Hotel => "Hotel",
            PinCategory::Museum => "Museum",
            PinCategory::Bar => "Bar",
            PinCategory::Park => "Park",
            PinCategory::Transportation => "Transportation",
            PinCategory::Shopping => "Shopping",
            PinCategory::Entertainment => "Entertainment",
            PinCategory::Other => "Other",
        }
    }

    /// Case-insensitive lookup by display name.
    pub fn parse(name: &str) -> Option<PinCategory> {
        let trimmed = name.trim();
        PinCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(trimmed))
    }

    /// Map marker colour for this category
    pub fn color(&self) -> &'static str {
        match self {
            PinCategory::Museum => "#4285F4",
            PinCategory::Attraction => "#EA4335",
            PinCategory::Hotel => "#9C27B0",
            PinCategory::Restaurant => "#FF9800",
            PinCategory::Bar => "#FBBC05",
            PinCategory::Park => "#34A853",
            PinCategory::Transportation => "#E91E63",
            PinCategory::Shopping => "#00B0FF",
            PinCategory::Entertainment => "#FFEB3B",
            PinCategory::Other => DEFAULT_MARKER_COLOR,
        }
    }
}

// ============================================================================
// PIN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub id: String,
    pub trip_id: String,
    pub nickname: String,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
    /// Free-form in storage; see [`Pin::category_kind`] for the typed view
    pub category: Option<String>,
    pub google_maps_id: Option<String>,
    pub visited_flag: bool,
    pub order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pin {
    /// Columns in the order `from_row` expects them.
    pub const COLUMNS: &'static str = r#"id, trip_id, nickname, latitude, longitude, notes, category,
        google_maps_id, visited_flag, "order", created_at, updated_at"#;

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Pin> {
        let created_at: String = row.get(10)?;
        let updated_at: Option<String> = row.get(11)?;

        Ok(Pin {
            id: row.get(0)?,
            trip_id: row.get(1)?,
            nickname: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            notes: row.get(5)?,
            category: row.get(6)?,
            google_maps_id: row.get(7)?,
            visited_flag: row.get(8)?,
            order: row.get(9)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    pub fn category_kind(&self) -> Option<PinCategory> {
        self.category.as_deref().and_then(PinCategory::parse)
    }

    /// One-based position for display ("1", "2", ...).
    pub fn position_label(&self) -> String {
        (self.order + 1).to_string()
    }
}

/// Input for creating a pin. The order is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPin {
    pub nickname: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub google_maps_id: Option<String>,
}

impl NewPin {
    pub fn validate(&self) -> Result<(), String> {
        if self.nickname.trim().is_empty() {
            return Err("pin nickname is required".to_string());
        }
        validate_coordinates(self.latitude, self.longitude)?;
        validate_category(self.category.as_deref())
    }
}

/// Editable details of an existing pin (edit modal and bulk edit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinDetails {
    pub nickname: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub visited_flag: bool,
}

impl PinDetails {
    pub fn validate(&self) -> Result<(), String> {
        if self.nickname.trim().is_empty() {
            return Err("pin nickname is required".to_string());
        }
        validate_category(self.category.as_deref())
    }
}

impl From<&Pin> for PinDetails {
    fn from(pin: &Pin) -> Self {
        PinDetails {
            nickname: pin.nickname.clone(),
            notes: pin.notes.clone(),
            category: pin.category.clone(),
            visited_flag: pin.visited_flag,
        }
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("latitude out of range: {}", latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("longitude out of range: {}", longitude));
    }
    Ok(())
}

fn validate_category(category: Option<&str>) -> Result<(), String> {
    match category {
        None => Ok(()),
        Some(c) if c.trim().is_empty() => Ok(()),
        Some(c) => PinCategory::parse(c)
            .map(|_| ())
            .ok_or_else(|| format!("unknown category: {}", c)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pin(order: i64, category: Option<&str>) -> Pin {
        Pin {
            id: "pin-1".to_string(),
            trip_id: "trip-1".to_string(),
            nickname: "Louvre".to_string(),
            latitude: 48.8606,
            longitude: 2.3376,
            notes: None,
            category: category.map(str::to_string),
            google_maps_id: None,
            visited_flag: false,
            order,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!(PinCategory::parse("museum"), Some(PinCategory::Museum));
        assert_eq!(PinCategory::parse(" Bar "), Some(PinCategory::Bar));
        assert_eq!(PinCategory::parse("Spaceport"), None);
    }

    #[test]
    fn test_category_colors() {
        assert_eq!(PinCategory::Museum.color(), "#4285F4");
        assert_eq!(PinCategory::Park.color(), "#34A853");
        assert_eq!(PinCategory::Other.color(), DEFAULT_MARKER_COLOR);
    }

    #[test]
    fn test_position_label_is_one_based() {
        assert_eq!(sample_pin(0, None).position_label(), "1");
        assert_eq!(sample_pin(4, None).position_label(), "5");
    }

    #[test]
    fn test_category_kind() {
        assert_eq!(sample_pin(0, Some("Hotel")).category_kind(), Some(PinCategory::Hotel));
        assert_eq!(sample_pin(0, None).category_kind(), None);
    }

    #[test]
    fn test_new_pin_validation() {
        let mut pin = NewPin {
            nickname: "Cafe".to_string(),
            latitude: 10.0,
            longitude: 20.0,
            ..Default::default()
        };
        assert!(pin.validate().is_ok());

        pin.latitude = 91.0;
        assert!(pin.validate().unwrap_err().contains("latitude"));

        pin.latitude = 10.0;
        pin.category = Some("Volcano".to_string());
        assert!(pin.validate().unwrap_err().contains("unknown category"));

        pin.category = None;
        pin.nickname = "   ".to_string();
        assert!(pin.validate().is_err());
    }
}
