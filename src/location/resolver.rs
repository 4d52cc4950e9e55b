//! Address resolver: orchestrates the fallback chain.
//!
//! Gazetteer proximity → address cache → reverse geocode (trusted proxy) → latitude band
//!
//! Resolution never fails: every coordinate ends up with some description.

use super::cache::{coordinate_key, AddressCache};
use super::gazetteer::Gazetteer;
use super::geocoder::{ReverseGeocodeRequest, ReverseGeocoder};
use super::types::{AddressSource, Coordinate};
use std::sync::Arc;
use std::time::Duration;

/// Gazetteer matches must lie strictly closer than this, in degrees.
pub const DEFAULT_PROXIMITY_THRESHOLD: f64 = 0.5;

/// Display-name parts kept when no gazetteer name matches.
const MAX_KEPT_PARTS: usize = 3;
const MIN_PART_LEN: usize = 3;

/// Label used for coordinates at or north of `min_latitude`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatitudeBand {
    pub min_latitude: f64,
    pub label: String,
}

impl LatitudeBand {
    pub fn new(min_latitude: f64, label: impl Into<String>) -> Self {
        Self { min_latitude, label: label.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Country name appended to every address and searched for in upstream answers.
    pub country: String,
    pub language: String,
    pub zoom: u8,
    pub proximity_threshold: f64,
    pub cache_max_age: Duration,
    /// Checked in order; the first band the latitude reaches wins.
    pub bands: Vec<LatitudeBand>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            country: "Libya".into(),
            language: "en".into(),
            zoom: 14,
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            cache_max_age: Duration::from_secs(30 * 24 * 3600),
            bands: vec![
                LatitudeBand::new(30.0, "Northern region"),
                LatitudeBand::new(26.0, "Central region"),
                LatitudeBand::new(-90.0, "Southern region"),
            ],
        }
    }
}

/// A display address and the chain link that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAddress {
    pub address: String,
    pub source: AddressSource,
}

/// The address resolver with its fallback pipeline.
#[derive(Clone)]
pub struct AddressResolver {
    gazetteer: Arc<Gazetteer>,
    geocoder: Arc<dyn ReverseGeocoder>,
    cache: Option<Arc<dyn AddressCache>>,
    config: ResolverConfig,
    offline: bool,
}

impl AddressResolver {
    pub fn new(gazetteer: Arc<Gazetteer>, geocoder: Arc<dyn ReverseGeocoder>, config: ResolverConfig) -> Self {
        Self {
            gazetteer,
            geocoder,
            cache: None,
            config,
            offline: false,
        }
    }

    /// Remember reverse-geocoded answers in `cache`.
    pub fn with_cache(mut self, cache: Arc<dyn AddressCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set offline mode: skip the cache and network steps.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    pub async fn resolve(&self, coordinate: &Coordinate) -> ResolvedAddress {
        let country = self.config.country.as_str();

        // 1. Nearby gazetteer place
        if let Some(place) = self.gazetteer.nearest_within(coordinate, self.config.proximity_threshold) {
            tracing::debug!(%coordinate, place = %place.name, "gazetteer match");
            return ResolvedAddress {
                address: place.canonical(country),
                source: AddressSource::Gazetteer,
            };
        }

        if !self.offline {
            let key = coordinate_key(coordinate);

            // 2. Previously geocoded
            if let Some(cache) = &self.cache {
                if let Some(address) = cache.get(&key, self.config.cache_max_age) {
                    tracing::debug!(%coordinate, "address cache hit");
                    return ResolvedAddress { address, source: AddressSource::Cache };
                }
            }

            // 3. Reverse geocode through the proxy
            let request = ReverseGeocodeRequest::new(coordinate, &self.config.language, self.config.zoom);
            match self.geocoder.reverse(&request).await {
                Ok(response) => match response.usable_display_name() {
                    Some(display) => {
                        let address = normalize_display_name(display, &self.gazetteer, country);
                        if let Some(cache) = &self.cache {
                            cache.put(&key, &address);
                        }
                        return ResolvedAddress {
                            address,
                            source: AddressSource::ReverseGeocode,
                        };
                    }
                    None => tracing::warn!(%coordinate, "reverse geocode returned no display name"),
                },
                Err(e) => tracing::warn!(%coordinate, error = %e, "reverse geocode failed"),
            }
        }

        // 4. Latitude band
        ResolvedAddress {
            address: self.band_label(coordinate),
            source: AddressSource::CoordinateBand,
        }
    }

    fn band_label(&self, coordinate: &Coordinate) -> String {
        let band = self
            .config
            .bands
            .iter()
            .find(|b| coordinate.latitude() >= b.min_latitude)
            .map(|b| b.label.as_str())
            .unwrap_or("Unmapped area");
        format!("{}, {} ({})", band, self.config.country, coordinate)
    }
}

/// Normalise an upstream display name to the app's naming.
///
/// "Souq al Juma, Tripoli District, Libya" → "Tripoli, Tripolitania, Libya"
/// "Wadi Zamzam, Nalut District, Libya" → "Wadi Zamzam, Nalut District, Libya" (if no gazetteer hit)
/// "Tunis, Tunisia" → unchanged
pub fn normalize_display_name(display: &str, gazetteer: &Gazetteer, country: &str) -> String {
    let country = country.trim();
    if country.is_empty() || !display.to_lowercase().contains(&country.to_lowercase()) {
        return display.to_string();
    }

    let parts: Vec<&str> = display.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();

    if let Some(place) = parts.iter().find_map(|p| gazetteer.fuzzy_find(p)) {
        return place.canonical(country);
    }

    let kept: Vec<&str> = parts
        .into_iter()
        .filter(|p| !p.eq_ignore_ascii_case(country) && p.chars().count() >= MIN_PART_LEN)
        .take(MAX_KEPT_PARTS)
        .collect();

    if kept.is_empty() {
        display.to_string()
    } else {
        format!("{}, {}", kept.join(", "), country)
    }
}
