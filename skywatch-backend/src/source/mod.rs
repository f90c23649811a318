//! HTTP and host-side implementations of the core location capabilities.

pub mod device;
pub mod geocode;
pub mod ip;

pub use device::{FixedGeoSource, UnsupportedGeoSource};
pub use geocode::NominatimSource;
pub use ip::IpApiSource;
