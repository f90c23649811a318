use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::LocationError;
use crate::location::source::{GeoOptions, GeoSource, GeocodeSource, IpLocationSource};
use crate::types::{Coordinates, LocationOrigin, LocationState, Place, ResolvePhase};

const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tuning for the resolution cascade.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// How long the cascade waits on the device source before falling back
    /// to the IP lookup.
    pub device_timeout: Duration,
    pub geo: GeoOptions,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            geo: GeoOptions::default(),
        }
    }
}

/// Orchestrates device -> IP -> manual location resolution.
///
/// The cascade runs as one spawned task per attempt. Manual entry, skip and
/// change-location act from outside it: each bumps the attempt counter and
/// aborts the running cascade, so an in-flight callback from a superseded
/// attempt can never overwrite a newer resolution. The counter is what
/// enforces last-write-wins; aborting alone cannot stop a commit that is
/// already racing the abort.
pub struct LocationResolver {
    geo: Arc<dyn GeoSource>,
    ip: Arc<dyn IpLocationSource>,
    geocoder: Arc<dyn GeocodeSource>,
    options: ResolverOptions,
    state: watch::Sender<LocationState>,
    attempt: AtomicU64,
    cascade: Mutex<Option<JoinHandle<()>>>,
}

impl LocationResolver {
    pub fn new(
        geo: Arc<dyn GeoSource>,
        ip: Arc<dyn IpLocationSource>,
        geocoder: Arc<dyn GeocodeSource>,
        options: ResolverOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(LocationState::idle());
        Arc::new(Self {
            geo,
            ip,
            geocoder,
            options,
            state,
            attempt: AtomicU64::new(0),
            cascade: Mutex::new(None),
        })
    }

    /// Snapshot stream for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> LocationState {
        self.state.borrow().clone()
    }

    /// Start (or restart) automatic resolution.
    ///
    /// Supersedes any cascade already running.
    pub fn start(self: &Arc<Self>) {
        let attempt = self.begin_attempt();
        debug!("Starting location cascade (attempt {})", attempt);

        let resolver = Arc::clone(self);
        let handle = tokio::spawn(async move { resolver.run_cascade(attempt).await });
        if let Some(previous) = self.cascade.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Short-circuit `AwaitingDevice`/`AwaitingNetwork` straight into manual
    /// entry. No-op in any other phase.
    pub fn skip_waiting(&self) {
        let mut skipped = false;
        self.state.send_modify(|state| {
            if matches!(
                state.phase,
                ResolvePhase::AwaitingDevice | ResolvePhase::AwaitingNetwork
            ) {
                state.phase = ResolvePhase::AwaitingManual;
                state.error = None;
                skipped = true;
            }
        });
        if skipped {
            info!("Skipping automatic location detection at user request");
            self.begin_attempt();
            self.abort_cascade();
        }
    }

    /// Return to manual entry from any phase.
    ///
    /// The last known coordinates stay in place until a new fix is
    /// confirmed.
    pub fn change_location(&self) {
        self.begin_attempt();
        self.abort_cascade();
        self.state.send_modify(|state| {
            state.phase = ResolvePhase::AwaitingManual;
            state.error = None;
        });
    }

    /// Geocode a user-entered place name and resolve to it.
    ///
    /// On no-match or transport failure the state is left untouched (manual
    /// entry stays available) and the error is returned for display.
    pub async fn submit_manual(&self, query: &str) -> Result<Coordinates, LocationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LocationError::NoMatch(query.to_string()));
        }

        debug!("Geocoding manual location entry \"{}\"", query);
        match self.geocoder.geocode(query).await {
            Ok(Some(coordinates)) => {
                // A manual fix is the newest resolution by definition:
                // invalidate whatever the cascade is still doing.
                let attempt = self.begin_attempt();
                self.abort_cascade();
                self.commit_resolved(attempt, LocationOrigin::Manual, coordinates, None);
                Ok(coordinates)
            }
            Ok(None) => {
                debug!("No geocoding match for \"{}\"", query);
                Err(LocationError::NoMatch(query.to_string()))
            }
            Err(e) => {
                warn!("Geocoding lookup failed for \"{}\": {:#}", query, e);
                Err(LocationError::Lookup(e.to_string()))
            }
        }
    }

    /// Tear everything down (component discarded). The device watch dies
    /// with the cascade task.
    pub fn shutdown(&self) {
        self.begin_attempt();
        self.abort_cascade();
    }

    async fn run_cascade(self: Arc<Self>, attempt: u64) {
        self.transition(attempt, ResolvePhase::AwaitingDevice);

        let mut fixes = self.geo.watch(&self.options.geo);
        let deadline = tokio::time::sleep(self.options.device_timeout);
        tokio::pin!(deadline);

        // Race the first device event against the fallback timer. A device
        // error cascades immediately; the timer only covers the case where
        // the device never answers at all.
        let mut device_open = true;
        tokio::select! {
            event = fixes.next() => match event {
                Some(Ok(fix)) => {
                    self.commit_resolved(
                        attempt,
                        LocationOrigin::Device,
                        fix.coordinates,
                        None,
                    );
                    return;
                }
                Some(Err(e)) => {
                    debug!("Device location unavailable: {}", e);
                    device_open = false;
                }
                None => {
                    debug!("Device location stream ended without a fix");
                    device_open = false;
                }
            },
            _ = &mut deadline => {
                debug!(
                    "No device fix within {:?}, falling back to IP lookup",
                    self.options.device_timeout
                );
            }
        }

        // The device watch stays open across the timeout: a fix that lands
        // before the IP lookup answers still wins the race.
        self.transition(attempt, ResolvePhase::AwaitingNetwork);

        let ip_lookup = self.ip.lookup();
        tokio::pin!(ip_lookup);
        loop {
            tokio::select! {
                event = fixes.next(), if device_open => match event {
                    Some(Ok(fix)) => {
                        self.commit_resolved(
                            attempt,
                            LocationOrigin::Device,
                            fix.coordinates,
                            None,
                        );
                        return;
                    }
                    Some(Err(e)) => {
                        debug!("Device location unavailable: {}", e);
                        device_open = false;
                    }
                    None => device_open = false,
                },
                outcome = &mut ip_lookup => {
                    match outcome {
                        Ok(Some(location)) => {
                            self.commit_resolved(
                                attempt,
                                LocationOrigin::Network,
                                location.coordinates,
                                Some(location.place),
                            );
                        }
                        Ok(None) => {
                            self.fail(
                                attempt,
                                "Could not determine a location from the network address",
                            );
                        }
                        Err(e) => {
                            warn!("IP location lookup failed: {:#}", e);
                            self.fail(attempt, format!("Location lookup failed: {}", e));
                        }
                    }
                    return;
                }
            }
        }
    }

    fn begin_attempt(&self) -> u64 {
        self.attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn abort_cascade(&self) {
        if let Some(handle) = self.cascade.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn transition(&self, attempt: u64, phase: ResolvePhase) {
        self.state.send_modify(|state| {
            if self.attempt.load(Ordering::SeqCst) != attempt {
                return;
            }
            state.phase = phase;
            state.error = None;
        });
    }

    fn fail(&self, attempt: u64, reason: impl Into<String>) {
        let reason = reason.into();
        let mut applied = false;
        self.state.send_modify(|state| {
            if self.attempt.load(Ordering::SeqCst) != attempt {
                return;
            }
            state.phase = ResolvePhase::Failed;
            state.error = Some(reason.clone());
            applied = true;
        });
        if applied {
            warn!("Location resolution failed: {}", reason);
        }
    }

    /// Publish a resolved location, unless a newer attempt has superseded
    /// this one in the meantime.
    fn commit_resolved(
        &self,
        attempt: u64,
        origin: LocationOrigin,
        coordinates: Coordinates,
        place: Option<Place>,
    ) -> bool {
        let mut committed = false;
        self.state.send_modify(|state| {
            if self.attempt.load(Ordering::SeqCst) != attempt {
                return;
            }
            state.coordinates = Some(coordinates);
            state.place = place;
            state.origin = Some(origin);
            state.phase = ResolvePhase::Resolved;
            state.error = None;
            committed = true;
        });
        if committed {
            info!("Location resolved via {} source: {}", origin, coordinates);
        } else {
            debug!("Discarding stale {} resolution (attempt {})", origin, attempt);
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::source::{GeoFix, GeoStream, IpLocation};
    use crate::types::LocationStatus;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn fix(lat: f64, lon: f64) -> GeoFix {
        GeoFix {
            coordinates: Coordinates::new(lat, lon),
            accuracy_m: 25.0,
        }
    }

    /// Device source driven by the test through a channel. Dropping the
    /// stream (watch teardown) closes the sender side.
    struct ChannelGeo {
        rx: StdMutex<Option<mpsc::UnboundedReceiver<Result<GeoFix, LocationError>>>>,
    }

    impl ChannelGeo {
        fn new() -> (
            Arc<Self>,
            mpsc::UnboundedSender<Result<GeoFix, LocationError>>,
        ) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    rx: StdMutex::new(Some(rx)),
                }),
                tx,
            )
        }
    }

    impl GeoSource for ChannelGeo {
        fn watch(&self, _options: &GeoOptions) -> GeoStream {
            let rx = self.rx.lock().unwrap().take().expect("watch opened twice");
            UnboundedReceiverStream::new(rx).boxed()
        }
    }

    /// Device source that never produces anything.
    struct SilentGeo;

    impl GeoSource for SilentGeo {
        fn watch(&self, _options: &GeoOptions) -> GeoStream {
            futures::stream::pending().boxed()
        }
    }

    struct FakeIp {
        response: StdMutex<Option<anyhow::Result<Option<IpLocation>>>>,
        delay: Duration,
    }

    impl FakeIp {
        fn answering(location: IpLocation, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: StdMutex::new(Some(Ok(Some(location)))),
                delay,
            })
        }

        fn empty(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: StdMutex::new(Some(Ok(None))),
                delay,
            })
        }

        fn failing(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: StdMutex::new(Some(Err(anyhow::anyhow!("connection refused")))),
                delay,
            })
        }
    }

    #[async_trait]
    impl IpLocationSource for FakeIp {
        async fn lookup(&self) -> anyhow::Result<Option<IpLocation>> {
            tokio::time::sleep(self.delay).await;
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(None))
        }
    }

    struct FakeGeocode {
        result: Option<Coordinates>,
    }

    #[async_trait]
    impl GeocodeSource for FakeGeocode {
        async fn geocode(&self, _query: &str) -> anyhow::Result<Option<Coordinates>> {
            Ok(self.result)
        }
    }

    fn oslo_by_ip() -> IpLocation {
        IpLocation {
            coordinates: Coordinates::new(59.91, 10.75),
            place: Place {
                city: Some("Oslo".to_string()),
                region: Some("Oslo".to_string()),
                country: Some("Norway".to_string()),
            },
        }
    }

    fn resolver(
        geo: Arc<dyn GeoSource>,
        ip: Arc<dyn IpLocationSource>,
        geocode: Option<Coordinates>,
    ) -> Arc<LocationResolver> {
        LocationResolver::new(
            geo,
            ip,
            Arc::new(FakeGeocode { result: geocode }),
            ResolverOptions::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn device_fix_resolves_with_device_origin() {
        let (geo, tx) = ChannelGeo::new();
        // The IP fallback would answer instantly; it must not matter.
        let ip = FakeIp::answering(oslo_by_ip(), Duration::ZERO);
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        tx.send(Ok(fix(47.37, 8.54))).unwrap();

        let state = rx
            .wait_for(|s| s.phase == ResolvePhase::Resolved)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.origin, Some(LocationOrigin::Device));
        assert_eq!(state.coordinates, Some(Coordinates::new(47.37, 8.54)));
        // The device path carries no place name.
        assert_eq!(state.place, None);
    }

    #[tokio::test(start_paused = true)]
    async fn device_error_falls_back_to_network() {
        let (geo, tx) = ChannelGeo::new();
        let ip = FakeIp::answering(oslo_by_ip(), Duration::from_millis(50));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        tx.send(Err(LocationError::Unsupported)).unwrap();

        let state = rx
            .wait_for(|s| s.phase == ResolvePhase::Resolved)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.origin, Some(LocationOrigin::Network));
        assert_eq!(
            state.place.as_ref().and_then(|p| p.city.as_deref()),
            Some("Oslo")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn device_timeout_and_ip_failure_end_in_failed() {
        let geo = Arc::new(SilentGeo);
        let ip = FakeIp::failing(Duration::from_millis(100));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();

        let state = rx
            .wait_for(|s| s.phase == ResolvePhase::Failed)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.status(), LocationStatus::Failed);
        assert!(state.error.is_some());
        assert!(state.manual_entry_available());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_ip_answer_counts_as_failure() {
        let geo = Arc::new(SilentGeo);
        let ip = FakeIp::empty(Duration::from_millis(10));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();

        let state = rx
            .wait_for(|s| s.phase == ResolvePhase::Failed)
            .await
            .unwrap()
            .clone();
        assert!(state.manual_entry_available());
    }

    #[tokio::test(start_paused = true)]
    async fn late_device_fix_beats_slower_ip_lookup() {
        let (geo, tx) = ChannelGeo::new();
        let ip = FakeIp::answering(oslo_by_ip(), Duration::from_secs(30));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        rx.wait_for(|s| s.phase == ResolvePhase::AwaitingNetwork)
            .await
            .unwrap();

        // Device answers during the network wait, before the lookup does.
        tx.send(Ok(fix(47.37, 8.54))).unwrap();

        let state = rx
            .wait_for(|s| s.phase == ResolvePhase::Resolved)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.origin, Some(LocationOrigin::Device));
    }

    #[tokio::test(start_paused = true)]
    async fn straggling_device_fix_is_discarded_after_network_resolution() {
        let (geo, tx) = ChannelGeo::new();
        let ip = FakeIp::answering(oslo_by_ip(), Duration::from_millis(10));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        let resolved = rx
            .wait_for(|s| s.phase == ResolvePhase::Resolved)
            .await
            .unwrap()
            .clone();
        assert_eq!(resolved.origin, Some(LocationOrigin::Network));

        // The watch was torn down on resolution, so a straggling fix has
        // nowhere to go.
        tokio::task::yield_now().await;
        assert!(tx.send(Ok(fix(1.0, 1.0))).is_err());
        assert_eq!(resolver.current(), resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_resolution_survives_inflight_ip_completion() {
        let geo = Arc::new(SilentGeo);
        let ip = FakeIp::answering(oslo_by_ip(), Duration::from_secs(60));
        let resolver = resolver(geo, ip, Some(Coordinates::new(35.68, 139.69)));
        let mut rx = resolver.subscribe();

        resolver.start();
        rx.wait_for(|s| s.phase == ResolvePhase::AwaitingNetwork)
            .await
            .unwrap();

        resolver.submit_manual("Tokyo").await.unwrap();
        let state = resolver.current();
        assert_eq!(state.origin, Some(LocationOrigin::Manual));
        assert_eq!(state.place, None);

        // Even if the aborted lookup had managed to complete, its attempt
        // number is stale now.
        tokio::time::sleep(Duration::from_secs(120)).await;
        let state = resolver.current();
        assert_eq!(state.origin, Some(LocationOrigin::Manual));
        assert_eq!(state.coordinates, Some(Coordinates::new(35.68, 139.69)));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_waiting_short_circuits_to_manual() {
        let (geo, tx) = ChannelGeo::new();
        let ip = FakeIp::answering(oslo_by_ip(), Duration::from_secs(30));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        rx.wait_for(|s| s.phase == ResolvePhase::AwaitingDevice)
            .await
            .unwrap();

        resolver.skip_waiting();
        assert_eq!(resolver.current().phase, ResolvePhase::AwaitingManual);

        // Cascade aborted, device watch torn down.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(tx.send(Ok(fix(1.0, 1.0))).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_waiting_is_a_noop_once_resolved() {
        let (geo, tx) = ChannelGeo::new();
        let ip = FakeIp::empty(Duration::ZERO);
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        tx.send(Ok(fix(47.37, 8.54))).unwrap();
        rx.wait_for(|s| s.phase == ResolvePhase::Resolved)
            .await
            .unwrap();

        resolver.skip_waiting();
        assert_eq!(resolver.current().phase, ResolvePhase::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn change_location_keeps_last_coordinates() {
        let (geo, tx) = ChannelGeo::new();
        let ip = FakeIp::empty(Duration::ZERO);
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        tx.send(Ok(fix(47.37, 8.54))).unwrap();
        rx.wait_for(|s| s.phase == ResolvePhase::Resolved)
            .await
            .unwrap();

        resolver.change_location();
        let state = resolver.current();
        assert_eq!(state.phase, ResolvePhase::AwaitingManual);
        assert_eq!(state.status(), LocationStatus::Pending);
        assert_eq!(state.coordinates, Some(Coordinates::new(47.37, 8.54)));
        assert_eq!(state.origin, Some(LocationOrigin::Device));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_no_match_leaves_state_untouched() {
        let geo = Arc::new(SilentGeo);
        let ip = FakeIp::empty(Duration::from_secs(60));
        let resolver = resolver(geo, ip, None);
        let mut rx = resolver.subscribe();

        resolver.start();
        rx.wait_for(|s| s.phase == ResolvePhase::AwaitingDevice)
            .await
            .unwrap();
        resolver.skip_waiting();

        let err = resolver.submit_manual("nowhere at all").await.unwrap_err();
        assert!(matches!(err, LocationError::NoMatch(_)));
        assert_eq!(resolver.current().phase, ResolvePhase::AwaitingManual);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_manual_query_is_rejected() {
        let geo = Arc::new(SilentGeo);
        let ip = FakeIp::empty(Duration::from_secs(60));
        let resolver = resolver(geo, ip, Some(Coordinates::new(0.0, 0.0)));

        let err = resolver.submit_manual("   ").await.unwrap_err();
        assert!(matches!(err, LocationError::NoMatch(_)));
    }
}
