//! Concrete implementations of the five astronomy data feeds.

pub mod aurora;
pub mod meteors;
pub mod moon;
pub mod planets;
pub mod satellites;

pub use aurora::SwpcAuroraFeed;
pub use meteors::CatalogMeteorFeed;
pub use moon::MoonApiFeed;
pub use planets::VisiblePlanetsFeed;
pub use satellites::N2yoPassesFeed;
