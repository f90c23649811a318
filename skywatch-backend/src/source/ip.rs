use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use skywatch_core::location::source::{IpLocation, IpLocationSource};
use skywatch_core::{Coordinates, Place};

const IPAPI_URL: &str = "https://ipapi.co/json/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// IP-based location fallback via ipapi.co.
///
/// The only source that returns a place record alongside the coordinates.
pub struct IpApiSource {
    client: reqwest::Client,
}

impl IpApiSource {
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
struct IpApiResponse {
    /// Set when the service cannot locate the caller (rate limit,
    /// reserved address, ...).
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
}

#[async_trait]
impl IpLocationSource for IpApiSource {
    async fn lookup(&self) -> Result<Option<IpLocation>> {
        debug!("Looking up location via {}", IPAPI_URL);

        let response = self
            .client
            .get(IPAPI_URL)
            .send()
            .await
            .context("Failed to reach IP geolocation service")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP error {} from IP geolocation service",
                response.status()
            );
        }

        let body: IpApiResponse = response
            .json()
            .await
            .context("Failed to parse IP geolocation response")?;

        if body.error {
            debug!(
                "IP geolocation service could not determine a location: {}",
                body.reason.as_deref().unwrap_or("no reason given")
            );
            return Ok(None);
        }
        let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) else {
            return Ok(None);
        };

        Ok(Some(IpLocation {
            coordinates: Coordinates::new(latitude, longitude),
            place: Place {
                city: body.city,
                region: body.region,
                country: body.country_name,
            },
        }))
    }
}
