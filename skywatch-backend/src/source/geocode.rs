use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use skywatch_core::location::source::GeocodeSource;
use skywatch_core::Coordinates;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Free-text geocoding via OpenStreetMap Nominatim.
///
/// Returns bare coordinates: the manual path does not fill in a place
/// record, only the IP path carries one.
pub struct NominatimSource {
    client: reqwest::Client,
}

impl NominatimSource {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

/// Nominatim returns latitude/longitude as strings.
#[derive(Debug, Deserialize)]
struct NominatimMatch {
    lat: String,
    lon: String,
}

#[async_trait]
impl GeocodeSource for NominatimSource {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinates>> {
        let url = format!(
            "{}?format=json&limit=1&q={}",
            NOMINATIM_URL,
            urlencoding::encode(query)
        );
        debug!("Geocoding \"{}\"", query);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach geocoding service for \"{}\"", query))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error {} from geocoding service", response.status());
        }

        let matches: Vec<NominatimMatch> = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        let Some(first) = matches.first() else {
            return Ok(None);
        };

        let latitude: f64 = first
            .lat
            .parse()
            .context("Geocoding service returned a non-numeric latitude")?;
        let longitude: f64 = first
            .lon
            .parse()
            .context("Geocoding service returned a non-numeric longitude")?;

        Ok(Some(Coordinates::new(latitude, longitude)))
    }
}
