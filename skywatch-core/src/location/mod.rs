pub mod resolver;
pub mod source;

pub use resolver::{LocationResolver, ResolverOptions};
pub use source::{GeoFix, GeoOptions, GeoSource, GeoStream, GeocodeSource, IpLocation, IpLocationSource};
