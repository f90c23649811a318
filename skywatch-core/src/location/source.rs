use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::LocationError;
use crate::types::{Coordinates, Place};

/// Options forwarded to the device location capability.
#[derive(Debug, Clone)]
pub struct GeoOptions {
    pub high_accuracy: bool,
    /// Deadline the capability itself applies to a single fix attempt. The
    /// resolver runs its own, usually shorter, fallback timer on top.
    pub timeout: Duration,
    /// Maximum age of a cached fix the capability may return. Zero forces a
    /// fresh reading.
    pub max_cache_age: Duration,
}

impl Default for GeoOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            max_cache_age: Duration::ZERO,
        }
    }
}

/// One reading from the device location capability.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFix {
    pub coordinates: Coordinates,
    pub accuracy_m: f64,
}

/// Result of an IP-based lookup: coordinates plus the place record this
/// path uniquely provides.
#[derive(Debug, Clone, PartialEq)]
pub struct IpLocation {
    pub coordinates: Coordinates,
    pub place: Place,
}

pub type GeoStream = BoxStream<'static, Result<GeoFix, LocationError>>;

/// Device's live-location capability.
///
/// `watch` opens a standing subscription; the resolver consumes at most one
/// successful reading and tears the watch down by dropping the stream. An
/// ended stream counts as a source error.
pub trait GeoSource: Send + Sync {
    fn watch(&self, options: &GeoOptions) -> GeoStream;
}

/// Fallback lookup via the caller's IP address.
///
/// `Ok(None)` means the provider answered but could not determine a
/// location; transport failures come back as `Err`. The cascade treats both
/// the same way.
#[async_trait]
pub trait IpLocationSource: Send + Sync {
    async fn lookup(&self) -> anyhow::Result<Option<IpLocation>>;
}

/// Free-text place name to coordinates, for manual entry.
///
/// The geocoder returns coordinates only and never fills in `Place`.
#[async_trait]
pub trait GeocodeSource: Send + Sync {
    async fn geocode(&self, query: &str) -> anyhow::Result<Option<Coordinates>>;
}
