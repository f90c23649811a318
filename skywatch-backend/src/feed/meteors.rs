use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tracing::debug;

use skywatch_core::{Coordinates, DataFeed, MeteorShower};

/// Days around the peak over which visibility tapers off to zero.
const VISIBILITY_WINDOW_DAYS: i64 = 30;

struct ShowerEntry {
    name: &'static str,
    peak_label: &'static str,
    peak_month: u32,
    peak_day: u32,
    /// Zenithal hourly rate at peak.
    zhr: f64,
}

/// The major annual showers the dashboard tracks.
const SHOWER_CATALOG: &[ShowerEntry] = &[
    ShowerEntry {
        name: "Quadrantids",
        peak_label: "January 3-4",
        peak_month: 1,
        peak_day: 3,
        zhr: 120.0,
    },
    ShowerEntry {
        name: "Lyrids",
        peak_label: "April 22-23",
        peak_month: 4,
        peak_day: 22,
        zhr: 18.0,
    },
    ShowerEntry {
        name: "Eta Aquariids",
        peak_label: "May 5-6",
        peak_month: 5,
        peak_day: 5,
        zhr: 50.0,
    },
    ShowerEntry {
        name: "Perseids",
        peak_label: "August 12-13",
        peak_month: 8,
        peak_day: 12,
        zhr: 100.0,
    },
    ShowerEntry {
        name: "Orionids",
        peak_label: "October 21-22",
        peak_month: 10,
        peak_day: 21,
        zhr: 20.0,
    },
    ShowerEntry {
        name: "Leonids",
        peak_label: "November 17-18",
        peak_month: 11,
        peak_day: 17,
        zhr: 15.0,
    },
    ShowerEntry {
        name: "Geminids",
        peak_label: "December 13-14",
        peak_month: 12,
        peak_day: 13,
        zhr: 150.0,
    },
];

/// Annual-shower feed computed from the catalog.
///
/// A shower counts as active in its peak month and the months either side
/// of it; visibility tapers linearly with distance from the peak day.
pub struct CatalogMeteorFeed;

impl CatalogMeteorFeed {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CatalogMeteorFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Month distance on the circular calendar, so December showers stay
/// active into January and vice versa.
fn month_distance(a: u32, b: u32) -> u32 {
    let diff = a.abs_diff(b);
    diff.min(12 - diff)
}

/// Days between `date` and the nearest occurrence of the shower's peak.
fn days_to_peak(date: NaiveDate, entry: &ShowerEntry) -> i64 {
    [date.year() - 1, date.year(), date.year() + 1]
        .iter()
        .filter_map(|&year| NaiveDate::from_ymd_opt(year, entry.peak_month, entry.peak_day))
        .map(|peak| (peak - date).num_days().abs())
        .min()
        .unwrap_or(i64::MAX)
}

fn shower_for_date(entry: &ShowerEntry, date: NaiveDate) -> MeteorShower {
    let active = month_distance(date.month(), entry.peak_month) <= 1;
    let visibility = if active {
        let distance = days_to_peak(date, entry);
        (1.0 - distance as f64 / VISIBILITY_WINDOW_DAYS as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    MeteorShower {
        name: entry.name.to_string(),
        active,
        peak: entry.peak_label.to_string(),
        rate_per_hour: if active { entry.zhr } else { 0.0 },
        visibility,
    }
}

#[async_trait]
impl DataFeed<Vec<MeteorShower>> for CatalogMeteorFeed {
    fn name(&self) -> &'static str {
        "meteor showers"
    }

    async fn fetch(
        &self,
        _coordinates: Coordinates,
        date: NaiveDate,
    ) -> Result<Vec<MeteorShower>> {
        debug!("Computing shower activity for {}", date);
        Ok(SHOWER_CATALOG
            .iter()
            .map(|entry| shower_for_date(entry, date))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn perseids_peak_night_is_fully_visible() {
        let perseids = &SHOWER_CATALOG[3];
        let shower = shower_for_date(perseids, date(2026, 8, 12));
        assert!(shower.active);
        assert_eq!(shower.rate_per_hour, 100.0);
        assert_eq!(shower.visibility, 1.0);
    }

    #[test]
    fn activity_window_spans_adjacent_months() {
        let perseids = &SHOWER_CATALOG[3];
        assert!(shower_for_date(perseids, date(2026, 7, 30)).active);
        assert!(shower_for_date(perseids, date(2026, 9, 10)).active);
        let out_of_season = shower_for_date(perseids, date(2026, 3, 1));
        assert!(!out_of_season.active);
        assert_eq!(out_of_season.rate_per_hour, 0.0);
        assert_eq!(out_of_season.visibility, 0.0);
    }

    #[test]
    fn december_showers_wrap_into_january() {
        let geminids = SHOWER_CATALOG.last().unwrap();
        assert_eq!(geminids.name, "Geminids");
        assert!(shower_for_date(geminids, date(2027, 1, 2)).active);

        let quadrantids = &SHOWER_CATALOG[0];
        assert!(shower_for_date(quadrantids, date(2026, 12, 28)).active);
        // The nearest peak is next year's January 3rd, six days away.
        let shower = shower_for_date(quadrantids, date(2026, 12, 28));
        assert!(shower.visibility > 0.7);
    }

    #[test]
    fn visibility_tapers_with_distance_from_peak() {
        let perseids = &SHOWER_CATALOG[3];
        let near = shower_for_date(perseids, date(2026, 8, 15));
        let far = shower_for_date(perseids, date(2026, 8, 30));
        assert!(near.visibility > far.visibility);
        assert!(far.visibility > 0.0);
    }

    #[tokio::test]
    async fn feed_reports_the_whole_catalog() {
        let feed = CatalogMeteorFeed::new();
        let showers = feed
            .fetch(Coordinates::new(59.91, 10.75), date(2026, 8, 7))
            .await
            .unwrap();
        assert_eq!(showers.len(), SHOWER_CATALOG.len());
        assert!(showers.iter().any(|s| s.name == "Perseids" && s.active));
        assert!(showers.iter().any(|s| s.name == "Geminids" && !s.active));
    }
}
