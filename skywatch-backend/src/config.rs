use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use skywatch_core::location::source::GeoOptions;
use skywatch_core::ResolverOptions;

use crate::feed::satellites::SatelliteTarget;

const CONFIG_ENV: &str = "SKYWATCH_CONFIG";
const CONFIG_FILE: &str = "skywatch.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Sent on every outbound request. Nominatim in particular requires an
    /// identifying user agent.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub location: LocationConfig,

    /// Fixed observer position, standing in for a device fix on hosts that
    /// have no location capability of their own.
    #[serde(default)]
    pub observer: Option<ObserverConfig>,

    #[serde(default)]
    pub feeds: FeedsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// How long to wait on the device source before the IP fallback.
    #[serde(default = "default_device_timeout_ms")]
    pub device_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub geo_high_accuracy: bool,

    #[serde(default = "default_geo_timeout_ms")]
    pub geo_timeout_ms: u64,

    #[serde(default)]
    pub geo_max_cache_age_ms: u64,

    /// Place name submitted through the manual path when the automatic
    /// cascade ends in failure.
    #[serde(default)]
    pub fallback_place: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObserverConfig {
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default = "default_accuracy_m")]
    pub accuracy_m: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Per-feed deadline; a feed slower than this counts as failed.
    #[serde(default = "default_feed_deadline_ms")]
    pub deadline_ms: u64,

    #[serde(default)]
    pub moon_api_key: Option<String>,

    #[serde(default)]
    pub n2yo_api_key: Option<String>,

    /// Satellites to predict passes for.
    #[serde(default = "default_satellites")]
    pub satellites: Vec<SatelliteTarget>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "skywatch-backend/0.1".to_string()
}

fn default_device_timeout_ms() -> u64 {
    5000
}

fn default_geo_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_accuracy_m() -> f64 {
    50.0
}

fn default_feed_deadline_ms() -> u64 {
    10_000
}

fn default_satellites() -> Vec<SatelliteTarget> {
    vec![
        SatelliteTarget {
            name: "ISS (ZARYA)".to_string(),
            norad_id: 25544,
        },
        SatelliteTarget {
            name: "Hubble Space Telescope".to_string(),
            norad_id: 20580,
        },
        SatelliteTarget {
            name: "NOAA-19".to_string(),
            norad_id: 33591,
        },
    ]
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            user_agent: default_user_agent(),
            location: LocationConfig::default(),
            observer: None,
            feeds: FeedsConfig::default(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            device_timeout_ms: default_device_timeout_ms(),
            geo_high_accuracy: default_true(),
            geo_timeout_ms: default_geo_timeout_ms(),
            geo_max_cache_age_ms: 0,
            fallback_place: None,
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_feed_deadline_ms(),
            moon_api_key: None,
            n2yo_api_key: None,
            satellites: default_satellites(),
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackendConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from `$SKYWATCH_CONFIG` or `skywatch.toml`; defaults when
    /// neither exists.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}

impl LocationConfig {
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            device_timeout: Duration::from_millis(self.device_timeout_ms),
            geo: GeoOptions {
                high_accuracy: self.geo_high_accuracy,
                timeout: Duration::from_millis(self.geo_timeout_ms),
                max_cache_age: Duration::from_millis(self.geo_max_cache_age_ms),
            },
        }
    }
}

impl FeedsConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}
