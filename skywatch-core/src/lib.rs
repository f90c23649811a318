//! Skywatch core: location resolution and astronomy aggregation.
//!
//! Resolves the observer's position through a device -> IP -> manual
//! fallback cascade, fans out to five independent astronomy feeds, and
//! derives a ranked list of highlights for the night. Concrete sources and
//! feeds are capability traits; see `skywatch-backend` for the HTTP-backed
//! implementations.

pub mod astro;
pub mod error;
pub mod location;
pub mod session;
pub mod types;

pub use astro::{AstronomyAggregator, AstronomyFeeds, DataFeed, derive_highlights};
pub use error::{AggregateError, LocationError};
pub use location::{LocationResolver, ResolverOptions};
pub use session::{AstroView, SkySession};
pub use types::{
    AstronomyData, AuroraForecast, Coordinates, Highlight, LocationOrigin, LocationState,
    LocationStatus, MeteorShower, MoonPhase, Place, PlanetVisibility, ResolvePhase, SatellitePass,
};
