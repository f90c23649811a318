use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use skywatch_core::{Coordinates, DataFeed, PlanetVisibility};

const VISIBLE_PLANETS_URL: &str = "https://api.visibleplanets.dev/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// The seven planets the dashboard reports on, in display order.
const PLANETS: &[&str] = &[
    "Mercury", "Venus", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune",
];

/// Planet visibility feed backed by visibleplanets.dev.
///
/// The service reports current altitude/azimuth per body; rise and set
/// times are not part of its payload and stay absent.
pub struct VisiblePlanetsFeed {
    client: reqwest::Client,
}

impl VisiblePlanetsFeed {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[derive(Debug, Deserialize)]
struct VisiblePlanetsResponse {
    data: Vec<BodyReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BodyReport {
    name: String,
    altitude: f64,
    azimuth: f64,
    above_horizon: bool,
}

fn to_visibility(reports: &[BodyReport]) -> Vec<PlanetVisibility> {
    PLANETS
        .iter()
        .map(|&name| {
            let report = reports.iter().find(|r| r.name == name);
            let visible = report.is_some_and(|r| r.above_horizon);
            PlanetVisibility {
                name: name.to_string(),
                visible,
                rise_time: None,
                set_time: None,
                altitude_deg: report.filter(|_| visible).map(|r| r.altitude),
                azimuth_deg: report.filter(|_| visible).map(|r| r.azimuth),
            }
        })
        .collect()
}

#[async_trait]
impl DataFeed<Vec<PlanetVisibility>> for VisiblePlanetsFeed {
    fn name(&self) -> &'static str {
        "planets"
    }

    async fn fetch(
        &self,
        coordinates: Coordinates,
        _date: NaiveDate,
    ) -> Result<Vec<PlanetVisibility>> {
        let url = format!(
            "{}?latitude={}&longitude={}",
            VISIBLE_PLANETS_URL, coordinates.latitude, coordinates.longitude
        );
        debug!("Fetching planet visibility for {}", coordinates);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach planet visibility service")?;
        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP error {} from planet visibility service",
                response.status()
            );
        }

        let body: VisiblePlanetsResponse = response
            .json()
            .await
            .context("Failed to parse planet visibility response")?;

        Ok(to_visibility(&body.data))
    }
}
