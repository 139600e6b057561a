// 🗺️ Map projection - what a map widget needs to draw a trip
//
// Pure functions. Rendering itself happens in the client; this module
// decides marker colours and labels, the viewport that fits a trip, and
// how a map click or place pick becomes a pin draft.

use serde::{Deserialize, Serialize};

use crate::entities::{NewPin, Pin, DEFAULT_MARKER_COLOR};

/// Initial view when there is nothing to show (New York City).
pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: 40.7128,
    lng: -74.0060,
};
pub const DEFAULT_ZOOM: u8 = 3;
/// Zoom after picking a place from search.
pub const PLACE_ZOOM: u8 = 15;
/// Fitting to a single pin never zooms further in than this.
pub const MAX_FIT_ZOOM: u8 = 15;
/// Web-mercator latitude limit.
pub const LATITUDE_LIMIT: f64 = 85.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Clamp latitude into the renderable band.
    pub fn clamped(self) -> LatLng {
        LatLng {
            lat: self.lat.clamp(-LATITUDE_LIMIT, LATITUDE_LIMIT),
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub pin_id: String,
    pub position: LatLng,
    pub title: String,
    /// One-based position in the trip
    pub label: String,
    pub color: &'static str,
    pub visited: bool,
}

impl From<&Pin> for MapMarker {
    fn from(pin: &Pin) -> Self {
        MapMarker {
            pin_id: pin.id.clone(),
            position: LatLng {
                lat: pin.latitude,
                lng: pin.longitude,
            },
            title: pin.nickname.clone(),
            label: pin.position_label(),
            color: pin
                .category_kind()
                .map(|c| c.color())
                .unwrap_or(DEFAULT_MARKER_COLOR),
            visited: pin.visited_flag,
        }
    }
}

/// Markers in list order.
pub fn markers(pins: &[Pin]) -> Vec<MapMarker> {
    pins.iter().map(MapMarker::from).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.south + self.north) / 2.0,
            lng: (self.west + self.east) / 2.0,
        }
    }

    pub fn is_point(&self) -> bool {
        self.south == self.north && self.west == self.east
    }
}

/// Smallest box containing every pin, or None for an empty trip.
pub fn bounds(pins: &[Pin]) -> Option<Bounds> {
    let first = pins.first()?;
    let mut b = Bounds {
        south: first.latitude,
        west: first.longitude,
        north: first.latitude,
        east: first.longitude,
    };
    for pin in &pins[1..] {
        b.south = b.south.min(pin.latitude);
        b.north = b.north.max(pin.latitude);
        b.west = b.west.min(pin.longitude);
        b.east = b.east.max(pin.longitude);
    }
    Some(b)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: u8,
    /// Present when the client should fit to a box instead of `zoom`
    pub bounds: Option<Bounds>,
}

/// Viewport that shows every pin. A single pin is centred at
/// `MAX_FIT_ZOOM`; an empty trip falls back to the default view.
pub fn fit_viewport(pins: &[Pin]) -> Viewport {
    match bounds(pins) {
        None => Viewport {
            center: DEFAULT_CENTER,
            zoom: DEFAULT_ZOOM,
            bounds: None,
        },
        Some(b) if b.is_point() => Viewport {
            center: b.center().clamped(),
            zoom: MAX_FIT_ZOOM,
            bounds: None,
        },
        Some(b) => Viewport {
            center: b.center().clamped(),
            zoom: zoom_for_span(&b),
            bounds: Some(b),
        },
    }
}

/// Rough zoom level at which the box fits a 256px-tile world view.
fn zoom_for_span(b: &Bounds) -> u8 {
    let lat_span = (b.north.min(LATITUDE_LIMIT) - b.south.max(-LATITUDE_LIMIT)).abs();
    let lng_span = (b.east - b.west).abs();
    let span = lat_span.max(lng_span).max(1e-6);
    let zoom = (360.0 / span).log2().floor();
    zoom.clamp(0.0, MAX_FIT_ZOOM as f64) as u8
}

/// A place picked from autocomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSelection {
    pub name: String,
    pub place_id: Option<String>,
    pub position: LatLng,
}

/// A pin that has been placed on the map but not yet saved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PinDraft {
    pub pin: NewPin,
    /// Where the map should move to show the draft
    pub center: LatLng,
    pub zoom: Option<u8>,
}

impl PlaceSelection {
    pub fn into_draft(self) -> PinDraft {
        let center = self.position.clamped();
        PinDraft {
            pin: NewPin {
                nickname: self.name,
                latitude: self.position.lat,
                longitude: self.position.lng,
                google_maps_id: self.place_id,
                ..Default::default()
            },
            center,
            zoom: Some(PLACE_ZOOM),
        }
    }
}

/// Draft from a raw map click; the nickname is filled in by the user.
pub fn draft_from_click(position: LatLng) -> PinDraft {
    PinDraft {
        pin: NewPin {
            latitude: position.lat,
            longitude: position.lng,
            ..Default::default()
        },
        center: position.clamped(),
        zoom: None,
    }
}
