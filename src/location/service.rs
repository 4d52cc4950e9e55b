//! Public entry points: fast lookup, precise lookup, manual pin.

use super::accuracy::Profile;
use super::acquirer::LocationAcquirer;
use super::resolver::AddressResolver;
use super::types::{AcquisitionError, Coordinate, ProgressEvent, ResolvedLocation};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Acquires a position and turns it into a display address.
#[derive(Clone)]
pub struct LocationService {
    acquirer: LocationAcquirer,
    resolver: AddressResolver,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl LocationService {
    pub fn new(acquirer: LocationAcquirer, resolver: AddressResolver) -> Self {
        Self {
            acquirer,
            resolver,
            progress: None,
        }
    }

    /// Report attempt and resolution progress to `sender`.
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.acquirer = self.acquirer.with_progress(sender.clone());
        self.progress = Some(sender);
        self
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    /// Single attempt under the `fast` profile.
    pub async fn acquire_fast(&self) -> Result<ResolvedLocation, AcquisitionError> {
        self.acquire(&Profile::FAST, &CancellationToken::new()).await
    }

    /// Full retry policy under the `precise` profile.
    pub async fn acquire_precise(&self) -> Result<ResolvedLocation, AcquisitionError> {
        self.acquire(&Profile::PRECISE, &CancellationToken::new()).await
    }

    /// Acquire under `profile`, then resolve the address. Cancelling `cancel`
    /// abandons the call at its next suspension point.
    pub async fn acquire(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<ResolvedLocation, AcquisitionError> {
        let reading = self.acquirer.acquire(profile, cancel).await?;
        let tier = profile.classify(reading.precision_meters);

        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AcquisitionError::Cancelled),
            resolved = self.resolver.resolve(&reading.coordinate) => resolved,
        };
        self.emit(ProgressEvent::Resolved { source: resolved.source });

        tracing::info!(
            profile = %profile.name,
            address = %resolved.address,
            precision = reading.precision_meters,
            %tier,
            source = %resolved.source,
            "location resolved"
        );

        Ok(ResolvedLocation {
            coordinate: reading.coordinate,
            display_address: resolved.address,
            precision_meters: reading.precision_meters,
            tier: Some(tier),
            source: resolved.source,
        })
    }

    /// Resolve a caller-supplied coordinate (e.g. a map pin). Never fails.
    pub async fn resolve_manual(&self, coordinate: Coordinate) -> ResolvedLocation {
        let resolved = self.resolver.resolve(&coordinate).await;
        self.emit(ProgressEvent::Resolved { source: resolved.source });
        tracing::info!(%coordinate, address = %resolved.address, source = %resolved.source, "manual pin resolved");

        ResolvedLocation {
            coordinate,
            display_address: resolved.address,
            precision_meters: 0.0,
            tier: None,
            source: resolved.source,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::accuracy::AccuracyTier;
    use crate::location::device::{DeviceError, DeviceLocation, PositionCallback, RequestOptions};
    use crate::location::gazetteer::Gazetteer;
    use crate::location::geocoder::{GeocodeError, ReverseGeocodeRequest, ReverseGeocodeResponse, ReverseGeocoder};
    use crate::location::resolver::ResolverConfig;
    use crate::location::types::{AddressSource, Reading};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Answers every request with the same outcome.
    struct FixedDevice {
        outcome: Result<(f64, f64, f64), DeviceError>,
        calls: AtomicUsize,
    }

    impl FixedDevice {
        fn at(lat: f64, lon: f64, precision: f64) -> Arc<Self> {
            Arc::new(Self { outcome: Ok((lat, lon, precision)), calls: AtomicUsize::new(0) })
        }

        fn failing(err: DeviceError) -> Arc<Self> {
            Arc::new(Self { outcome: Err(err), calls: AtomicUsize::new(0) })
        }
    }

    impl DeviceLocation for FixedDevice {
        fn request_position(&self, _options: &RequestOptions, callback: PositionCallback) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            callback(self.outcome.map(|(lat, lon, precision)| {
                Reading::new(Coordinate::new(lat, lon).unwrap(), precision)
            }));
        }
    }

    /// Never answers; keeps callbacks alive so only the timeout ends a request.
    #[derive(Default)]
    struct SilentDevice {
        parked: Mutex<Vec<PositionCallback>>,
    }

    impl DeviceLocation for SilentDevice {
        fn request_position(&self, _options: &RequestOptions, callback: PositionCallback) {
            self.parked.lock().unwrap().push(callback);
        }
    }

    struct CountingGeocoder {
        calls: AtomicUsize,
        display: Option<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl ReverseGeocoder for CountingGeocoder {
        async fn reverse(&self, _request: &ReverseGeocodeRequest) -> Result<ReverseGeocodeResponse, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.display {
                Some(d) => Ok(ReverseGeocodeResponse { display_name: Some(d.to_string()) }),
                None => Err(GeocodeError::Network("connection refused".into())),
            }
        }
    }

    fn geocoder(display: Option<&'static str>) -> Arc<CountingGeocoder> {
        Arc::new(CountingGeocoder { calls: AtomicUsize::new(0), display, delay: Duration::ZERO })
    }

    fn service(device: Arc<dyn DeviceLocation>, geocoder: Arc<CountingGeocoder>) -> LocationService {
        let resolver = AddressResolver::new(Gazetteer::builtin(), geocoder, ResolverConfig::default());
        LocationService::new(LocationAcquirer::new(device), resolver)
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_fast_in_tripoli() {
        let geo = geocoder(None);
        let svc = service(FixedDevice::at(32.88, 13.19, 40.0), geo.clone());

        let loc = svc.acquire_fast().await.unwrap();
        assert_eq!(loc.display_address, "Tripoli, Tripolitania, Libya");
        assert_eq!(loc.tier, Some(AccuracyTier::Good));
        assert_eq!(loc.source, AddressSource::Gazetteer);
        assert_eq!(geo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_fast_accepts_poor_single_reading() {
        let fast = Profile {
            acceptable_radius_meters: 100.0,
            good_radius_meters: 50.0,
            ..Profile::FAST
        };
        let device = FixedDevice::at(32.12, 20.07, 500.0);
        let svc = service(device.clone(), geocoder(None));

        let loc = svc.acquire(&fast, &CancellationToken::new()).await.unwrap();
        assert_eq!(device.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loc.tier, Some(AccuracyTier::Poor));
        assert!(loc.caveat().is_some());
        assert_eq!(loc.display_address, "Benghazi, Cyrenaica, Libya");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_precise_retries_poor_device() {
        let device = FixedDevice::at(25.5, 18.5, 800.0);
        let svc = service(device.clone(), geocoder(Some("Rebiana Sand Sea, Kufra District, Libya")));

        let loc = svc.acquire_precise().await.unwrap();
        assert_eq!(device.calls.load(Ordering::SeqCst), 3);
        assert_eq!(loc.tier, Some(AccuracyTier::Poor));
        assert_eq!(loc.display_address, "Kufra, Cyrenaica, Libya");
        assert_eq!(loc.source, AddressSource::ReverseGeocode);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_surfaces() {
        let device = FixedDevice::failing(DeviceError::PermissionDenied);
        let svc = service(device.clone(), geocoder(None));

        let err = svc.acquire_precise().await.unwrap_err();
        assert_eq!(err, AcquisitionError::PermissionDenied);
        assert_eq!(device.calls.load(Ordering::SeqCst), 1);
        assert!(err.user_message().contains("Enable location access"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let svc = service(Arc::new(SilentDevice::default()), geocoder(None));
        assert_eq!(svc.acquire_fast().await.unwrap_err(), AcquisitionError::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_manual_always_succeeds() {
        let geo = geocoder(None);
        let svc = service(FixedDevice::failing(DeviceError::CapabilityAbsent), geo.clone());

        let loc = svc.resolve_manual(Coordinate::new(22.0, 11.0).unwrap()).await;
        assert_eq!(loc.display_address, "Southern region, Libya (22.0000, 11.0000)");
        assert_eq!(loc.tier, None);
        assert_eq!(loc.precision_meters, 0.0);
        assert_eq!(geo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_resolution_discards_result() {
        let slow = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            display: Some("Late answer, Libya"),
            delay: Duration::from_secs(4),
        });
        let svc = service(FixedDevice::at(25.5, 18.5, 10.0), slow.clone());
        let cancel = CancellationToken::new();

        let task = {
            let svc = svc.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { svc.acquire(&Profile::FAST, &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), Err(AcquisitionError::Cancelled));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_ends_with_resolution() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let svc = service(FixedDevice::at(32.88, 13.19, 5.0), geocoder(None)).with_progress(tx);

        svc.acquire_fast().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&ProgressEvent::AttemptStarted { attempt: 1, max_attempts: 1 }));
        assert_eq!(events.last(), Some(&ProgressEvent::Resolved { source: AddressSource::Gazetteer }));
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_independent() {
        let svc = service(FixedDevice::at(32.88, 13.19, 5.0), geocoder(Some("Hay Demo, Libya")));
        let a = svc.resolve_manual(Coordinate::new(32.12, 20.07).unwrap());
        let b = svc.resolve_manual(Coordinate::new(27.04, 14.43).unwrap());
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.display_address, "Benghazi, Cyrenaica, Libya");
        assert_eq!(b.display_address, "Sabha, Fezzan, Libya");
    }
}
