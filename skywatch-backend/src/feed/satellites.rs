use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use skywatch_core::{Coordinates, DataFeed, SatellitePass};

const N2YO_BASE_URL: &str = "https://api.n2yo.com/rest/v1/satellite";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Delay between per-satellite requests to stay clear of rate limits.
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(200);
const PASS_WINDOW_DAYS: u32 = 1;
const MIN_VISIBILITY_SECONDS: u32 = 60;

/// One satellite to predict passes for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteTarget {
    pub name: String,
    pub norad_id: u32,
}

/// Visible-pass predictions from the N2YO API, one request per configured
/// satellite.
///
/// N2YO predicts forward from the current time; the feed reports the
/// one-day window as the requested night's passes.
pub struct N2yoPassesFeed {
    client: reqwest::Client,
    api_key: Option<String>,
    targets: Vec<SatelliteTarget>,
}

impl N2yoPassesFeed {
    pub fn new(
        user_agent: &str,
        api_key: Option<String>,
        targets: Vec<SatelliteTarget>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            targets,
        })
    }

    async fn fetch_passes(
        &self,
        api_key: &str,
        target: &SatelliteTarget,
        coordinates: Coordinates,
    ) -> Result<Vec<SatellitePass>> {
        let url = format!(
            "{}/visualpasses/{}/{:.4}/{:.4}/0/{}/{}/?apiKey={}",
            N2YO_BASE_URL,
            target.norad_id,
            coordinates.latitude,
            coordinates.longitude,
            PASS_WINDOW_DAYS,
            MIN_VISIBILITY_SECONDS,
            api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach pass prediction service for {}", target.name))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP error {} from pass prediction service for {}",
                response.status(),
                target.name
            );
        }

        let body: VisualPassesResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse pass response for {}", target.name))?;

        let passes = body
            .passes
            .unwrap_or_default()
            .into_iter()
            .filter_map(|pass| pass.into_satellite_pass(&target.name))
            .collect();
        Ok(passes)
    }

    /// Retry a single satellite in the usual fetch-with-backoff shape.
    async fn fetch_with_retries(
        &self,
        api_key: &str,
        target: &SatelliteTarget,
        coordinates: Coordinates,
    ) -> Result<Vec<SatellitePass>> {
        let mut last_error = None;
        for attempt in 1..=MAX_RETRIES {
            if attempt > 1 {
                tokio::time::sleep(RETRY_DELAY * attempt).await;
                debug!(
                    "Retrying {} (attempt {}/{})",
                    target.name, attempt, MAX_RETRIES
                );
            }
            match self.fetch_passes(api_key, target, coordinates).await {
                Ok(passes) => {
                    debug!("Fetched {} passes for {}", passes.len(), target.name);
                    return Ok(passes);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No pass data for {}", target.name)))
    }
}

#[derive(Debug, Deserialize)]
struct VisualPassesResponse {
    /// Absent when no visible pass falls inside the window.
    passes: Option<Vec<N2yoPass>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct N2yoPass {
    #[serde(rename = "startUTC")]
    start_utc: i64,
    #[serde(rename = "endUTC")]
    end_utc: i64,
    max_el: f64,
    start_az: f64,
    end_az: f64,
}

impl N2yoPass {
    fn into_satellite_pass(self, name: &str) -> Option<SatellitePass> {
        let start_time = DateTime::<Utc>::from_timestamp(self.start_utc, 0)?;
        let end_time = DateTime::<Utc>::from_timestamp(self.end_utc, 0)?;
        Some(SatellitePass {
            name: name.to_string(),
            start_time,
            end_time,
            max_elevation_deg: self.max_el,
            start_azimuth_deg: self.start_az,
            end_azimuth_deg: self.end_az,
            // The visualpasses endpoint only returns optically visible
            // passes.
            visible: true,
        })
    }
}

#[async_trait]
impl DataFeed<Vec<SatellitePass>> for N2yoPassesFeed {
    fn name(&self) -> &'static str {
        "satellites"
    }

    async fn fetch(
        &self,
        coordinates: Coordinates,
        _date: NaiveDate,
    ) -> Result<Vec<SatellitePass>> {
        let api_key = self
            .api_key
            .as_deref()
            .context("No N2YO API key configured")?;

        let mut all_passes = Vec::new();
        let mut failures = 0;
        for (index, target) in self.targets.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(INTER_REQUEST_DELAY).await;
            }
            match self.fetch_with_retries(api_key, target, coordinates).await {
                Ok(passes) => all_passes.extend(passes),
                Err(e) => {
                    warn!("Pass prediction failed for {}: {:#}", target.name, e);
                    failures += 1;
                }
            }
        }

        // Partial data is fine; a fully failed fan-out is a feed failure.
        if failures == self.targets.len() && !self.targets.is_empty() {
            anyhow::bail!("All {} satellite lookups failed", failures);
        }

        all_passes.sort_by_key(|pass| pass.start_time);
        Ok(all_passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_payload_converts() {
        let body: VisualPassesResponse = serde_json::from_str(
            r#"{
                "info": {"satid": 25544, "satname": "SPACE STATION", "passescount": 1},
                "passes": [{
                    "startAz": 230.5, "startAzCompass": "SW", "startEl": 10.0,
                    "startUTC": 1770500000,
                    "maxAz": 170.0, "maxAzCompass": "S", "maxEl": 57.3,
                    "maxUTC": 1770500300,
                    "endAz": 80.1, "endAzCompass": "E", "endEl": 10.0,
                    "endUTC": 1770500600,
                    "mag": -2.9, "duration": 600
                }]
            }"#,
        )
        .unwrap();

        let passes: Vec<SatellitePass> = body
            .passes
            .unwrap()
            .into_iter()
            .filter_map(|p| p.into_satellite_pass("ISS (ZARYA)"))
            .collect();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].name, "ISS (ZARYA)");
        assert_eq!(passes[0].max_elevation_deg, 57.3);
        assert!(passes[0].visible);
        assert_eq!(passes[0].start_time.timestamp(), 1770500000);
    }

    #[test]
    fn missing_passes_field_means_no_passes() {
        let body: VisualPassesResponse = serde_json::from_str(
            r#"{"info": {"satid": 20580, "satname": "HST", "passescount": 0}}"#,
        )
        .unwrap();
        assert!(body.passes.is_none());
    }

    #[tokio::test]
    async fn missing_api_key_is_a_feed_error() {
        let feed = N2yoPassesFeed::new(
            "skywatch-backend/0.1 (test)",
            None,
            vec![SatelliteTarget {
                name: "ISS (ZARYA)".to_string(),
                norad_id: 25544,
            }],
        )
        .unwrap();
        let err = feed
            .fetch(
                Coordinates::new(59.91, 10.75),
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
