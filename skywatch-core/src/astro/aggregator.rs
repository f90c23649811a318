use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::astro::feed::DataFeed;
use crate::error::AggregateError;
use crate::types::{
    AstronomyData, AuroraForecast, Coordinates, MeteorShower, MoonPhase, PlanetVisibility,
    SatellitePass,
};

/// The observed design waits on feeds with no deadline at all, which lets a
/// single hung call stall the whole gather. Feeds get this budget instead;
/// exceeding it counts as a plain feed failure.
const DEFAULT_FEED_DEADLINE: Duration = Duration::from_secs(10);

/// The five capability slots the aggregator fans out to.
pub struct AstronomyFeeds {
    pub moon: Arc<dyn DataFeed<MoonPhase>>,
    pub planets: Arc<dyn DataFeed<Vec<PlanetVisibility>>>,
    pub satellites: Arc<dyn DataFeed<Vec<SatellitePass>>>,
    pub meteor_showers: Arc<dyn DataFeed<Vec<MeteorShower>>>,
    pub aurora: Arc<dyn DataFeed<AuroraForecast>>,
}

/// Fans out to all feeds concurrently and merges whatever settled into one
/// immutable snapshot.
///
/// Feed failures are isolated per slot; the only fatal input is a position
/// that cannot exist, which is rejected before anything is dispatched.
pub struct AstronomyAggregator {
    feeds: AstronomyFeeds,
    feed_deadline: Duration,
}

impl AstronomyAggregator {
    pub fn new(feeds: AstronomyFeeds) -> Self {
        Self {
            feeds,
            feed_deadline: DEFAULT_FEED_DEADLINE,
        }
    }

    pub fn with_feed_deadline(mut self, deadline: Duration) -> Self {
        self.feed_deadline = deadline;
        self
    }

    /// Build the snapshot for one `(coordinates, date)` key.
    ///
    /// All five feeds are dispatched together and all are waited on; a
    /// failed or late feed leaves its sub-record absent.
    pub async fn resolve(
        &self,
        coordinates: Coordinates,
        date: NaiveDate,
    ) -> Result<AstronomyData, AggregateError> {
        coordinates.validate()?;

        debug!("Aggregating astronomy data for {} on {}", coordinates, date);

        let (moon_phase, planets, satellites, meteor_showers, aurora) = tokio::join!(
            self.settle(&self.feeds.moon, coordinates, date),
            self.settle(&self.feeds.planets, coordinates, date),
            self.settle(&self.feeds.satellites, coordinates, date),
            self.settle(&self.feeds.meteor_showers, coordinates, date),
            self.settle(&self.feeds.aurora, coordinates, date),
        );

        Ok(AstronomyData {
            coordinates,
            date,
            moon_phase,
            planets,
            satellites,
            meteor_showers,
            aurora,
        })
    }

    /// Wrap a single feed call so its failure becomes a value. Each slot is
    /// wrapped on its own; a shared catch here would fail all five on one
    /// feed's error.
    async fn settle<T>(
        &self,
        feed: &Arc<dyn DataFeed<T>>,
        coordinates: Coordinates,
        date: NaiveDate,
    ) -> Option<T> {
        match tokio::time::timeout(self.feed_deadline, feed.fetch(coordinates, date)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("{} feed failed: {:#}", feed.name(), e);
                None
            }
            Err(_) => {
                warn!(
                    "{} feed exceeded its {:?} deadline",
                    feed.name(),
                    self.feed_deadline
                );
                None
            }
        }
    }
}
