use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use skywatch_backend::config::BackendConfig;
use skywatch_backend::feed::{
    CatalogMeteorFeed, MoonApiFeed, N2yoPassesFeed, SwpcAuroraFeed, VisiblePlanetsFeed,
};
use skywatch_backend::logging;
use skywatch_backend::source::{FixedGeoSource, IpApiSource, NominatimSource, UnsupportedGeoSource};

use skywatch_core::location::source::GeoSource;
use skywatch_core::{
    AstroView, AstronomyAggregator, AstronomyFeeds, LocationResolver, LocationState,
    LocationStatus, SkySession,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BackendConfig::load()?;

    let _logging_guard = logging::init_logging("logs", "skywatch-backend", &config.log_level);

    info!("Skywatch backend starting...");

    let geo: Arc<dyn GeoSource> = match &config.observer {
        Some(observer) => {
            info!(
                "Using configured observer position {:.4}, {:.4}",
                observer.latitude, observer.longitude
            );
            Arc::new(FixedGeoSource::new(
                observer.latitude,
                observer.longitude,
                observer.accuracy_m,
            ))
        }
        None => Arc::new(UnsupportedGeoSource),
    };
    let ip = Arc::new(IpApiSource::new(&config.user_agent)?);
    let geocoder = Arc::new(NominatimSource::new(&config.user_agent)?);
    let resolver = LocationResolver::new(geo, ip, geocoder, config.location.resolver_options());

    let feeds = AstronomyFeeds {
        moon: Arc::new(MoonApiFeed::new(
            &config.user_agent,
            config.feeds.moon_api_key.clone(),
        )?),
        planets: Arc::new(VisiblePlanetsFeed::new(&config.user_agent)?),
        satellites: Arc::new(N2yoPassesFeed::new(
            &config.user_agent,
            config.feeds.n2yo_api_key.clone(),
            config.feeds.satellites.clone(),
        )?),
        meteor_showers: Arc::new(CatalogMeteorFeed::new()),
        aurora: Arc::new(SwpcAuroraFeed::new(&config.user_agent)?),
    };
    let aggregator =
        Arc::new(AstronomyAggregator::new(feeds).with_feed_deadline(config.feeds.deadline()));

    let tonight = Utc::now().date_naive();
    let session = SkySession::new(resolver, aggregator, tonight);

    let mut location_rx = session.subscribe_location();
    let mut view_rx = session.subscribe_view();
    session.start();

    // Let the cascade settle; if it runs out of automatic options, the
    // configured fallback place stands in for the manual form.
    let state = location_rx
        .wait_for(|s| s.status() != LocationStatus::Pending)
        .await?
        .clone();
    if state.status() == LocationStatus::Failed {
        match &config.location.fallback_place {
            Some(place) => {
                warn!(
                    "Automatic location detection failed ({}); falling back to \"{}\"",
                    state.error.as_deref().unwrap_or("no reason given"),
                    place
                );
                session.resolver().submit_manual(place).await?;
            }
            None => {
                anyhow::bail!(
                    "Could not resolve a location automatically; configure [observer] or location.fallback_place"
                );
            }
        }
    }
    report_location(&session.subscribe_location().borrow().clone());

    let view = view_rx.wait_for(|v| v.data.is_some()).await?.clone();
    report_conditions(&view);

    session.shutdown();
    Ok(())
}

fn report_location(state: &LocationState) {
    let Some(coordinates) = state.coordinates else {
        return;
    };
    let place = state
        .place
        .as_ref()
        .map(|p| {
            [p.city.as_deref(), p.region.as_deref(), p.country.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|s| !s.is_empty());

    match (state.origin, place) {
        (Some(origin), Some(place)) => {
            info!("Observing from {} ({} location): {}", place, origin, coordinates)
        }
        (Some(origin), None) => info!("Observing from {} ({} location)", coordinates, origin),
        _ => info!("Observing from {}", coordinates),
    }
}

fn report_conditions(view: &AstroView) {
    let Some(data) = &view.data else {
        return;
    };

    info!("Conditions for the night of {}:", data.date);

    if let Some(moon) = &data.moon_phase {
        info!(
            "  Moon: {} ({:.0}% illuminated, {:.1} days old)",
            moon.phase_name,
            moon.illumination * 100.0,
            moon.age_days
        );
    }
    if let Some(planets) = &data.planets {
        let visible: Vec<&str> = planets
            .iter()
            .filter(|p| p.visible)
            .map(|p| p.name.as_str())
            .collect();
        if visible.is_empty() {
            info!("  Planets: none above the horizon");
        } else {
            info!("  Planets: {}", visible.join(", "));
        }
    }
    if let Some(satellites) = &data.satellites {
        for pass in satellites.iter().filter(|p| p.visible) {
            info!(
                "  Pass: {} at {} (max elevation {:.0}°)",
                pass.name,
                pass.start_time.format("%H:%M UTC"),
                pass.max_elevation_deg
            );
        }
    }
    if let Some(showers) = &data.meteor_showers {
        for shower in showers.iter().filter(|s| s.active) {
            info!(
                "  Shower: {} (peak {}, ~{:.0}/h)",
                shower.name, shower.peak, shower.rate_per_hour
            );
        }
    }
    if let Some(aurora) = &data.aurora {
        info!(
            "  Aurora: Kp {:.1}, probability {:.0}%",
            aurora.kp_index,
            aurora.probability * 100.0
        );
    }

    if view.highlights.is_empty() {
        info!("No special astronomical events tonight.");
    } else {
        info!("Tonight's highlights:");
        for highlight in &view.highlights {
            info!(
                "  {} {}: {}",
                highlight.icon, highlight.title, highlight.description
            );
        }
    }
}
