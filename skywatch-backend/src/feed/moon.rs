use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use skywatch_core::{Coordinates, DataFeed, MoonPhase};

const MOON_API_URL: &str = "https://moon-api.com/v1/moon";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Moon phase feed backed by moon-api.com.
pub struct MoonApiFeed {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl MoonApiFeed {
    pub fn new(user_agent: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, api_key })
    }
}

#[derive(Debug, Deserialize)]
struct MoonResponse {
    phase: MoonResponsePhase,
    illumination: f64,
    age: f64,
    #[serde(rename = "nextFullMoon")]
    next_full_moon: NaiveDate,
    #[serde(rename = "nextNewMoon")]
    next_new_moon: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct MoonResponsePhase {
    name: String,
}

#[async_trait]
impl DataFeed<MoonPhase> for MoonApiFeed {
    fn name(&self) -> &'static str {
        "moon"
    }

    async fn fetch(&self, coordinates: Coordinates, date: NaiveDate) -> Result<MoonPhase> {
        let url = format!(
            "{}?lat={}&lng={}&date={}",
            MOON_API_URL, coordinates.latitude, coordinates.longitude, date
        );
        debug!("Fetching moon phase for {}", date);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach moon phase service")?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP error {} from moon phase service", response.status());
        }

        let body: MoonResponse = response
            .json()
            .await
            .context("Failed to parse moon phase response")?;

        Ok(MoonPhase {
            phase_name: body.phase.name,
            illumination: body.illumination,
            age_days: body.age,
            next_full_moon: body.next_full_moon,
            next_new_moon: body.next_new_moon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_payload_parses() {
        let body: MoonResponse = serde_json::from_str(
            r#"{
                "phase": {"name": "Waxing Gibbous"},
                "illumination": 0.82,
                "age": 10.4,
                "nextFullMoon": "2026-08-28",
                "nextNewMoon": "2026-08-12"
            }"#,
        )
        .unwrap();
        assert_eq!(body.phase.name, "Waxing Gibbous");
        assert_eq!(
            body.next_full_moon,
            NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
        );
    }

    #[tokio::test]
    #[ignore] // Requires network connection and an API key
    async fn fetch_against_live_service() {
        let feed = MoonApiFeed::new("skywatch-backend/0.1 (test)", None).unwrap();
        let result = feed
            .fetch(
                Coordinates::new(59.91, 10.75),
                NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            )
            .await;
        assert!(result.is_ok() || result.is_err());
    }
}
