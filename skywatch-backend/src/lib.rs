//! Host side of Skywatch: configuration, logging, and the HTTP-backed
//! implementations of the core's location-source and data-feed
//! capabilities.

pub mod config;
pub mod feed;
pub mod logging;
pub mod source;
