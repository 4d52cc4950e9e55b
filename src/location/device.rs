//! Device location capability and an IP-geolocation backed implementation.

use super::accuracy::Profile;
use super::types::{AcquisitionError, Coordinate, Reading};
use chrono::Utc;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hints passed to the device for one position request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub maximum_age: Duration,
    pub high_accuracy: bool,
}

impl From<&Profile> for RequestOptions {
    fn from(profile: &Profile) -> Self {
        Self {
            timeout: profile.timeout,
            maximum_age: profile.maximum_age,
            high_accuracy: profile.high_accuracy,
        }
    }
}

/// Failure kinds a device may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    Timeout,
    PositionUnavailable,
    PermissionDenied,
    CapabilityAbsent,
}

impl From<DeviceError> for AcquisitionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Timeout => Self::Timeout,
            DeviceError::PositionUnavailable => Self::PositionUnavailable,
            DeviceError::PermissionDenied => Self::PermissionDenied,
            DeviceError::CapabilityAbsent => Self::CapabilityAbsent,
        }
    }
}

/// Receives the single outcome of a position request.
pub type PositionCallback = Box<dyn FnOnce(Result<Reading, DeviceError>) + Send + 'static>;

/// A platform location capability.
///
/// `request_position` must eventually invoke `callback` at most once; the
/// acquirer bounds the wait with its own timeout and treats a dropped
/// callback as an unavailable position.
pub trait DeviceLocation: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    fn request_position(&self, options: &RequestOptions, callback: PositionCallback);
}

/// Stand-in for platforms without any location capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevice;

impl DeviceLocation for NoDevice {
    fn is_available(&self) -> bool {
        false
    }

    fn request_position(&self, _options: &RequestOptions, callback: PositionCallback) {
        callback(Err(DeviceError::CapabilityAbsent));
    }
}

// ─── IP-based device ────────────────────────────────────────────

const IP_API_URL: &str = "https://ipapi.co/json/";

/// IP geolocation resolves to the ISP's city at best.
pub const IP_PRECISION_METERS: f64 = 5000.0;

#[derive(Deserialize)]
struct IpApiResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Coarse device that locates the host by its public IP address.
pub struct IpDevice {
    url: String,
    user_agent: String,
    last: Arc<Mutex<Option<Reading>>>,
}

impl IpDevice {
    pub fn new() -> Self {
        Self::with_url(IP_API_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: format!("SouqLocator/{}", env!("CARGO_PKG_VERSION")),
            last: Arc::new(Mutex::new(None)),
        }
    }

    fn cached(&self, maximum_age: Duration) -> Option<Reading> {
        let last = self.last.lock().ok()?;
        let reading = last.as_ref()?;
        let age = (Utc::now() - reading.captured_at).to_std().ok()?;
        (age <= maximum_age).then(|| reading.clone())
    }
}

impl Default for IpDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceLocation for IpDevice {
    fn request_position(&self, options: &RequestOptions, callback: PositionCallback) {
        if let Some(reading) = self.cached(options.maximum_age) {
            tracing::debug!(age_limit = ?options.maximum_age, "reusing cached IP reading");
            callback(Ok(reading));
            return;
        }

        let url = self.url.clone();
        let user_agent = self.user_agent.clone();
        let timeout = options.timeout;
        let last = Arc::clone(&self.last);

        std::thread::spawn(move || {
            let outcome = ip_geolocate(&url, &user_agent, timeout);
            if let (Ok(reading), Ok(mut slot)) = (&outcome, last.lock()) {
                *slot = Some(reading.clone());
            }
            callback(outcome);
        });
    }
}

fn ip_geolocate(url: &str, user_agent: &str, timeout: Duration) -> Result<Reading, DeviceError> {
    let response = ureq::get(url)
        .set("User-Agent", user_agent)
        .timeout(timeout)
        .call()
        .map_err(|e| {
            tracing::warn!(error = %e, "IP geolocation request failed");
            match e {
                ureq::Error::Status(403, _) => DeviceError::PermissionDenied,
                _ => DeviceError::PositionUnavailable,
            }
        })?;

    let r: IpApiResult = response.into_json().map_err(|e| {
        tracing::warn!(error = %e, "invalid IP geolocation response");
        DeviceError::PositionUnavailable
    })?;

    let (lat, lon) = r.latitude.zip(r.longitude).ok_or(DeviceError::PositionUnavailable)?;
    let coordinate = Coordinate::new(lat, lon).map_err(|_| DeviceError::PositionUnavailable)?;
    Ok(Reading::new(coordinate, IP_PRECISION_METERS))
}
