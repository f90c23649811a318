pub mod aggregator;
pub mod feed;
pub mod highlights;

pub use aggregator::{AstronomyAggregator, AstronomyFeeds};
pub use feed::DataFeed;
pub use highlights::{aurora_visible, derive_highlights};
