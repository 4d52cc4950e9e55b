//! Accuracy tiers and the built-in acquisition profiles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Bucket derived from a reading's precision radius. Ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyTier {
    Good,
    Acceptable,
    Poor,
}

impl fmt::Display for AccuracyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "good"),
            Self::Acceptable => write!(f, "acceptable"),
            Self::Poor => write!(f, "poor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    Fast,
    Precise,
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Precise => write!(f, "precise"),
        }
    }
}

impl FromStr for ProfileName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "precise" => Ok(Self::Precise),
            other => Err(format!("Unknown profile '{}'. Use 'fast' or 'precise'.", other)),
        }
    }
}

/// Timeout, retry and accuracy settings for one acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: ProfileName,
    /// Per-attempt bound on the device request.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Oldest cached device reading the device may hand back.
    pub maximum_age: Duration,
    pub acceptable_radius_meters: f64,
    pub good_radius_meters: f64,
    /// Desired-accuracy hint forwarded to the device.
    pub high_accuracy: bool,
}

impl Profile {
    /// Latency over precision: one short attempt, generous radius.
    pub const FAST: Profile = Profile {
        name: ProfileName::Fast,
        timeout: Duration::from_secs(5),
        max_attempts: 1,
        retry_delay: Duration::ZERO,
        maximum_age: Duration::from_secs(60),
        acceptable_radius_meters: 1000.0,
        good_radius_meters: 100.0,
        high_accuracy: false,
    };

    pub const PRECISE: Profile = Profile {
        name: ProfileName::Precise,
        timeout: Duration::from_secs(15),
        max_attempts: 3,
        retry_delay: Duration::from_secs(2),
        maximum_age: Duration::ZERO,
        acceptable_radius_meters: 100.0,
        good_radius_meters: 20.0,
        high_accuracy: true,
    };

    pub fn named(name: ProfileName) -> &'static Profile {
        match name {
            ProfileName::Fast => &Self::FAST,
            ProfileName::Precise => &Self::PRECISE,
        }
    }

    /// Attempt budget; a zero budget still makes one attempt.
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn classify(&self, precision_meters: f64) -> AccuracyTier {
        classify(precision_meters, self)
    }
}

/// Map a precision radius to a tier under `profile`.
///
/// Zero is a perfect reading. Negative or non-finite radii are untrusted
/// and always Poor.
pub fn classify(precision_meters: f64, profile: &Profile) -> AccuracyTier {
    if !precision_meters.is_finite() || precision_meters < 0.0 {
        return AccuracyTier::Poor;
    }
    if precision_meters <= profile.good_radius_meters {
        AccuracyTier::Good
    } else if precision_meters <= profile.acceptable_radius_meters {
        AccuracyTier::Acceptable
    } else {
        AccuracyTier::Poor
    }
}
