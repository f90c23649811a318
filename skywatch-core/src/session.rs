//! Session glue between location resolution and astronomy aggregation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::astro::aggregator::AstronomyAggregator;
use crate::astro::highlights::derive_highlights;
use crate::location::resolver::LocationResolver;
use crate::types::{AstronomyData, Coordinates, Highlight, LocationState, LocationStatus};

/// What the presentation layer renders for the astronomy panel.
///
/// Replaced wholesale on every change; `highlights` always corresponds to
/// the `data` it is published with.
#[derive(Debug, Clone, Default)]
pub struct AstroView {
    pub data: Option<AstronomyData>,
    pub highlights: Vec<Highlight>,
    pub loading: bool,
    pub error: Option<String>,
}

/// One user session: drives the location cascade, re-aggregates on every
/// resolved fix or date change, and publishes the resulting view.
///
/// Aggregations are keyed by a generation counter; a result that arrives
/// after a newer request was issued is dropped, so the view only ever shows
/// the latest `(coordinates, date)` pair.
pub struct SkySession {
    resolver: Arc<LocationResolver>,
    aggregator: Arc<AstronomyAggregator>,
    view: watch::Sender<AstroView>,
    generation: AtomicU64,
    date: RwLock<NaiveDate>,
}

impl SkySession {
    pub fn new(
        resolver: Arc<LocationResolver>,
        aggregator: Arc<AstronomyAggregator>,
        date: NaiveDate,
    ) -> Arc<Self> {
        let (view, _) = watch::channel(AstroView::default());
        Arc::new(Self {
            resolver,
            aggregator,
            view,
            generation: AtomicU64::new(0),
            date: RwLock::new(date),
        })
    }

    /// Kick off the location cascade and keep the view in sync with it.
    pub fn start(self: &Arc<Self>) {
        self.resolver.start();

        let session = Arc::clone(self);
        let mut location_rx = self.resolver.subscribe();
        tokio::spawn(async move {
            loop {
                {
                    let state = location_rx.borrow_and_update().clone();
                    if state.status() == LocationStatus::Resolved {
                        if let Some(coordinates) = state.coordinates {
                            session.refresh(coordinates);
                        }
                    }
                }
                if location_rx.changed().await.is_err() {
                    debug!("Location resolver gone, session loop ending");
                    break;
                }
            }
        });
    }

    pub fn subscribe_view(&self) -> watch::Receiver<AstroView> {
        self.view.subscribe()
    }

    pub fn subscribe_location(&self) -> watch::Receiver<LocationState> {
        self.resolver.subscribe()
    }

    pub fn resolver(&self) -> &Arc<LocationResolver> {
        &self.resolver
    }

    /// Change the date the snapshot is computed for. Re-aggregates
    /// immediately when a location is already resolved.
    pub fn set_date(self: &Arc<Self>, date: NaiveDate) {
        {
            let mut current = self.date.write().unwrap();
            if *current == date {
                return;
            }
            *current = date;
        }
        info!("Snapshot date changed to {}", date);
        let state = self.resolver.current();
        if state.status() == LocationStatus::Resolved {
            if let Some(coordinates) = state.coordinates {
                self.refresh(coordinates);
            }
        }
    }

    /// Launch an aggregation for the current date at the given position.
    /// Any aggregation still in flight is superseded.
    fn refresh(self: &Arc<Self>, coordinates: Coordinates) {
        let date = *self.date.read().unwrap();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.view.send_modify(|view| {
            view.loading = true;
            view.error = None;
        });

        let session = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = session.aggregator.resolve(coordinates, date).await;

            // Only publish if this is still the newest request; a stale
            // snapshot must never replace a fresher one.
            if session.generation.load(Ordering::SeqCst) != generation {
                debug!(
                    "Discarding superseded snapshot for {} on {}",
                    coordinates, date
                );
                return;
            }

            session.view.send_modify(|view| match outcome {
                Ok(data) => {
                    view.highlights = derive_highlights(&data);
                    view.data = Some(data);
                    view.loading = false;
                    view.error = None;
                }
                Err(e) => {
                    view.loading = false;
                    view.error = Some(e.to_string());
                }
            });
        });
    }

    pub fn shutdown(&self) {
        self.resolver.shutdown();
    }
}
