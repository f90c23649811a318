use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use skywatch_core::{AuroraForecast, Coordinates, DataFeed};

const SWPC_KP_URL: &str = "https://services.swpc.noaa.gov/json/planetary_k_index_1m.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Aurora forecast from the NOAA SWPC planetary K index.
///
/// The service reports recent one-minute estimated Kp samples; the latest
/// sample drives the forecast, weighted by how far the observer is from
/// the auroral oval.
pub struct SwpcAuroraFeed {
    client: reqwest::Client,
}

impl SwpcAuroraFeed {
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
struct KpSample {
    #[allow(dead_code)]
    time_tag: String,
    estimated_kp: f64,
}

/// Fold the Kp index and observer latitude into the forecast triple.
fn forecast_from_kp(kp_index: f64, latitude: f64) -> AuroraForecast {
    let kp_index = kp_index.clamp(0.0, 9.0);
    let abs_latitude = latitude.abs();

    let latitude_effect = if abs_latitude > 50.0 {
        0.7
    } else if abs_latitude > 40.0 {
        0.3
    } else {
        0.1
    };

    let (probability, visibility) = if kp_index > 5.0 {
        (0.8 * latitude_effect, 0.9 * latitude_effect)
    } else if kp_index > 3.0 {
        (0.5 * latitude_effect, 0.6 * latitude_effect)
    } else {
        (0.2 * latitude_effect, 0.3 * latitude_effect)
    };

    AuroraForecast {
        kp_index,
        probability,
        visibility,
    }
}

#[async_trait]
impl DataFeed<AuroraForecast> for SwpcAuroraFeed {
    fn name(&self) -> &'static str {
        "aurora"
    }

    async fn fetch(&self, coordinates: Coordinates, _date: NaiveDate) -> Result<AuroraForecast> {
        debug!("Fetching planetary K index");

        let response = self
            .client
            .get(SWPC_KP_URL)
            .send()
            .await
            .context("Failed to reach space weather service")?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP error {} from space weather service", response.status());
        }

        let samples: Vec<KpSample> = response
            .json()
            .await
            .context("Failed to parse K index response")?;

        let latest = samples
            .last()
            .context("Space weather service returned no K index samples")?;

        Ok(forecast_from_kp(latest.estimated_kp, coordinates.latitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_kp_at_high_latitude_scores_highest() {
        let forecast = forecast_from_kp(7.2, 69.6);
        assert_eq!(forecast.kp_index, 7.2);
        assert!((forecast.probability - 0.56).abs() < 1e-9);
        assert!((forecast.visibility - 0.63).abs() < 1e-9);
    }

    #[test]
    fn low_latitude_damps_the_forecast() {
        let high = forecast_from_kp(6.0, 65.0);
        let low = forecast_from_kp(6.0, 20.0);
        assert!(high.probability > low.probability);
        assert!((low.probability - 0.08).abs() < 1e-9);
    }

    #[test]
    fn kp_is_clamped_to_scale() {
        assert_eq!(forecast_from_kp(11.3, 60.0).kp_index, 9.0);
        assert_eq!(forecast_from_kp(-0.5, 60.0).kp_index, 0.0);
    }

    #[test]
    fn sample_payload_parses() {
        let samples: Vec<KpSample> = serde_json::from_str(
            r#"[
                {"time_tag": "2026-08-07T18:58:00", "kp_index": 4, "estimated_kp": 4.33, "kp": "4M"},
                {"time_tag": "2026-08-07T18:59:00", "kp_index": 4, "estimated_kp": 4.67, "kp": "5-"}
            ]"#,
        )
        .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples.last().unwrap().estimated_kp, 4.67);
    }

    #[tokio::test]
    #[ignore] // Requires network connection
    async fn fetch_against_live_service() {
        let feed = SwpcAuroraFeed::new("skywatch-backend/0.1 (test)").unwrap();
        let result = feed
            .fetch(
                Coordinates::new(69.65, 18.96),
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            )
            .await;
        assert!(result.is_ok() || result.is_err());
    }
}
