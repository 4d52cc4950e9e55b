//! Core types for the location subsystem.

use super::accuracy::AccuracyTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Planar distance in degree space. Not geodesically corrected.
    pub fn degree_distance(&self, other: &Coordinate) -> f64 {
        let dlat = self.latitude - other.latitude;
        let dlon = self.longitude - other.longitude;
        (dlat * dlat + dlon * dlon).sqrt()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Rejected latitude/longitude pair.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid coordinates ({latitude}, {longitude}): lat must be -90..90, lon -180..180")]
pub struct CoordinateError {
    pub latitude: f64,
    pub longitude: f64,
}

/// One sample from the device location capability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub coordinate: Coordinate,
    pub precision_meters: f64,
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(coordinate: Coordinate, precision_meters: f64) -> Self {
        Self {
            coordinate,
            precision_meters,
            captured_at: Utc::now(),
        }
    }

    /// Precision radius for ranking; untrusted values rank last.
    pub(crate) fn effective_precision(&self) -> f64 {
        if self.precision_meters.is_finite() && self.precision_meters >= 0.0 {
            self.precision_meters
        } else {
            f64::INFINITY
        }
    }
}

/// Which link of the resolver chain produced the display address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    Gazetteer,
    Cache,
    ReverseGeocode,
    CoordinateBand,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gazetteer => write!(f, "Gazetteer"),
            Self::Cache => write!(f, "Cache"),
            Self::ReverseGeocode => write!(f, "Reverse geocode"),
            Self::CoordinateBand => write!(f, "Coordinate band"),
        }
    }
}

/// Final answer handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub coordinate: Coordinate,
    pub display_address: String,
    pub precision_meters: f64,
    /// Accuracy tier of the acquired reading; `None` for manual pins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<AccuracyTier>,
    pub source: AddressSource,
}

impl ResolvedLocation {
    /// Advisory note for readings that were accepted despite a poor tier.
    pub fn caveat(&self) -> Option<&'static str> {
        match self.tier {
            Some(AccuracyTier::Poor) => Some("low precision: the position may be off by a wide margin"),
            _ => None,
        }
    }

    pub fn display_line(&self) -> String {
        let precision = if self.tier.is_some() {
            format!(" (\u{00B1}{:.0} m)", self.precision_meters)
        } else {
            String::new()
        };
        format!(
            "\u{1F4CD} {}\n  \u{1F4D0} {}{}",
            self.display_address, self.coordinate, precision
        )
    }
}

/// Errors a caller of the acquisition entry points can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionError {
    #[error("timed out waiting for a position")]
    Timeout,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("permission denied")]
    PermissionDenied,
    #[error("location capability absent")]
    CapabilityAbsent,
    /// The caller abandoned the call.
    #[error("cancelled")]
    Cancelled,
}

impl AcquisitionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::PositionUnavailable)
    }

    /// Actionable message for the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Timeout => "Locating took too long. Move to an open area and try again.",
            Self::PositionUnavailable => {
                "Your position could not be determined. Check that location services are on."
            }
            Self::PermissionDenied => "Permission denied. Enable location access for this app.",
            Self::CapabilityAbsent => {
                "This device cannot report its location. Pick your place on the map instead."
            }
            Self::Cancelled => "Location lookup cancelled.",
        }
    }
}

/// Progress and diagnostic events for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    AttemptStarted {
        attempt: u32,
        max_attempts: u32,
    },
    ReadingObserved {
        attempt: u32,
        precision_meters: f64,
        tier: AccuracyTier,
    },
    AttemptFailed {
        attempt: u32,
        error: AcquisitionError,
    },
    RetryScheduled {
        next_attempt: u32,
        delay_ms: u64,
    },
    Resolved {
        source: AddressSource,
    },
}
