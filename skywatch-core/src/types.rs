use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

/// Geographic position of the observer.
///
/// Immutable once produced by a location source. Validation happens at the
/// aggregation boundary, not on construction: sources hand these through
/// as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Reject out-of-range or non-finite values.
    pub fn validate(&self) -> Result<(), AggregateError> {
        let lat_ok = (-90.0..=90.0).contains(&self.latitude);
        let lon_ok = (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(AggregateError::InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Human-readable place attached to a resolved location.
///
/// Only the IP path fills this in; device fixes and geocoded manual entries
/// carry coordinates alone. Fields stay optional because IP lookups may
/// return partial records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Place {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Which source produced the currently resolved location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationOrigin {
    Device,
    Network,
    Manual,
}

impl LocationOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationOrigin::Device => "device",
            LocationOrigin::Network => "network",
            LocationOrigin::Manual => "manual",
        }
    }
}

impl std::fmt::Display for LocationOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse resolution status, derived from [`ResolvePhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationStatus {
    Pending,
    Resolved,
    Failed,
}

/// Exact state of the resolution cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvePhase {
    Idle,
    AwaitingDevice,
    AwaitingNetwork,
    AwaitingManual,
    Resolved,
    Failed,
}

/// Snapshot of the session's location, published whole on every change.
///
/// Exactly one of these is live per session; later resolutions replace it
/// wholesale (last-resolved-wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationState {
    pub coordinates: Option<Coordinates>,
    pub place: Option<Place>,
    pub origin: Option<LocationOrigin>,
    pub phase: ResolvePhase,
    /// Displayable reason, set when the cascade ends in `Failed`.
    pub error: Option<String>,
}

impl LocationState {
    pub fn idle() -> Self {
        Self {
            coordinates: None,
            place: None,
            origin: None,
            phase: ResolvePhase::Idle,
            error: None,
        }
    }

    pub fn status(&self) -> LocationStatus {
        match self.phase {
            ResolvePhase::Resolved => LocationStatus::Resolved,
            ResolvePhase::Failed => LocationStatus::Failed,
            _ => LocationStatus::Pending,
        }
    }

    /// The manual-entry form is offered once the cascade has run out of
    /// automatic options, or when the user asked for it.
    pub fn manual_entry_available(&self) -> bool {
        matches!(
            self.phase,
            ResolvePhase::AwaitingManual | ResolvePhase::Failed
        )
    }
}

impl Default for LocationState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Current moon phase and the dates of the next syzygies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoonPhase {
    pub phase_name: String,
    /// Illuminated fraction, 0.0 (new) to 1.0 (full).
    pub illumination: f64,
    pub age_days: f64,
    pub next_full_moon: NaiveDate,
    pub next_new_moon: NaiveDate,
}

/// Visibility of one planet for the night. Rise/set and position are only
/// populated when the planet is visible, and only if the feed reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetVisibility {
    pub name: String,
    pub visible: bool,
    #[serde(default)]
    pub rise_time: Option<String>,
    #[serde(default)]
    pub set_time: Option<String>,
    #[serde(default)]
    pub altitude_deg: Option<f64>,
    #[serde(default)]
    pub azimuth_deg: Option<f64>,
}

/// One predicted satellite pass over the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatellitePass {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_elevation_deg: f64,
    pub start_azimuth_deg: f64,
    pub end_azimuth_deg: f64,
    pub visible: bool,
}

/// Activity of one annual meteor shower around the requested date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteorShower {
    pub name: String,
    pub active: bool,
    /// Display label for the peak, e.g. "August 12-13".
    pub peak: String,
    /// Expected meteors per hour; zero when inactive.
    pub rate_per_hour: f64,
    /// Observing conditions for the shower, 0.0 to 1.0.
    pub visibility: f64,
}

/// Geomagnetic activity forecast driving aurora likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuroraForecast {
    /// Planetary K index, 0 to 9.
    pub kp_index: f64,
    pub probability: f64,
    pub visibility: f64,
}

/// Immutable astronomy snapshot for one `(coordinates, date)` pair.
///
/// Each sub-record is independently absent if its feed failed. A new
/// location or date produces a new snapshot; nothing is patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstronomyData {
    pub coordinates: Coordinates,
    pub date: NaiveDate,
    pub moon_phase: Option<MoonPhase>,
    pub planets: Option<Vec<PlanetVisibility>>,
    pub satellites: Option<Vec<SatellitePass>>,
    pub meteor_showers: Option<Vec<MeteorShower>>,
    pub aurora: Option<AuroraForecast>,
}

/// One noteworthy condition for the night, ranked for display.
///
/// Lower `priority` sorts first; ties keep rule order. Derived from a
/// snapshot, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub title: String,
    pub description: String,
    pub icon: String,
    pub priority: u8,
}
