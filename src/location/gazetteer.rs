//! Built-in place table with proximity and fuzzy name lookup.

use super::types::Coordinate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// A named place the resolver can answer with offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub name: String,
    pub region: String,
    pub coordinate: Coordinate,
    /// Alternate spellings, including Arabic names.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl PlaceCandidate {
    /// `"{name}, {region}, {country}"`
    pub fn canonical(&self, country: &str) -> String {
        format!("{}, {}, {}", self.name, self.region, country)
    }

    /// Case-insensitive substring containment in either direction, against
    /// the name and every alias.
    fn matches_loosely(&self, part: &str) -> bool {
        let p = part.to_lowercase();
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|n| n.to_lowercase())
            .any(|n| n.contains(&p) || p.contains(&n))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GazetteerError {
    #[error("cannot read gazetteer file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid gazetteer file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("gazetteer is empty")]
    Empty,
}

/// Read-only place table.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    places: Vec<PlaceCandidate>,
}

/// Parts shorter than this never take part in fuzzy matching.
const MIN_FUZZY_LEN: usize = 3;

struct BuiltinPlace {
    names: &'static [&'static str], // canonical + aliases
    region: &'static str,
    lat: f64,
    lon: f64,
}

const BUILTIN_PLACES: &[BuiltinPlace] = &[
    BuiltinPlace { names: &["Tripoli", "Tarabulus", "طرابلس"], region: "Tripolitania", lat: 32.8872, lon: 13.1913 },
    BuiltinPlace { names: &["Benghazi", "Banghazi", "بنغازي"], region: "Cyrenaica", lat: 32.1167, lon: 20.0667 },
    BuiltinPlace { names: &["Misrata", "Misurata", "مصراتة"], region: "Tripolitania", lat: 32.3754, lon: 15.0925 },
    BuiltinPlace { names: &["Zawiya", "Az Zawiyah", "الزاوية"], region: "Tripolitania", lat: 32.7571, lon: 12.7276 },
    BuiltinPlace { names: &["Bayda", "Al Bayda", "البيضاء"], region: "Cyrenaica", lat: 32.7627, lon: 21.7551 },
    BuiltinPlace { names: &["Tobruk", "Tubruq", "طبرق"], region: "Cyrenaica", lat: 32.0836, lon: 23.9764 },
    BuiltinPlace { names: &["Derna", "Darnah", "درنة"], region: "Cyrenaica", lat: 32.7648, lon: 22.6391 },
    BuiltinPlace { names: &["Sirte", "Surt", "سرت"], region: "Tripolitania", lat: 31.2089, lon: 16.5887 },
    BuiltinPlace { names: &["Khoms", "Al Khums", "الخمس"], region: "Tripolitania", lat: 32.6486, lon: 14.2619 },
    BuiltinPlace { names: &["Gharyan", "غريان"], region: "Tripolitania", lat: 32.1722, lon: 13.0203 },
    BuiltinPlace { names: &["Zliten", "Zlitan", "زليتن"], region: "Tripolitania", lat: 32.4674, lon: 14.5687 },
    BuiltinPlace { names: &["Ajdabiya", "Ajdabiyah", "أجدابيا"], region: "Cyrenaica", lat: 30.7554, lon: 20.2263 },
    BuiltinPlace { names: &["Brega", "Marsa al Brega", "البريقة"], region: "Cyrenaica", lat: 30.4058, lon: 19.5754 },
    BuiltinPlace { names: &["Kufra", "Al Kufrah", "الكفرة"], region: "Cyrenaica", lat: 24.1997, lon: 23.2906 },
    BuiltinPlace { names: &["Nalut", "نالوت"], region: "Tripolitania", lat: 31.8685, lon: 10.9812 },
    BuiltinPlace { names: &["Ghadames", "Ghadamis", "غدامس"], region: "Tripolitania", lat: 30.1337, lon: 9.5007 },
    BuiltinPlace { names: &["Sabha", "Sebha", "سبها"], region: "Fezzan", lat: 27.0377, lon: 14.4283 },
    BuiltinPlace { names: &["Ubari", "Awbari", "أوباري"], region: "Fezzan", lat: 26.5903, lon: 12.7751 },
    BuiltinPlace { names: &["Murzuq", "Murzuk", "مرزق"], region: "Fezzan", lat: 25.9155, lon: 13.9184 },
    BuiltinPlace { names: &["Ghat", "غات"], region: "Fezzan", lat: 24.9647, lon: 10.1728 },
];

fn builtin_to_candidate(place: &BuiltinPlace) -> Option<PlaceCandidate> {
    let coordinate = Coordinate::new(place.lat, place.lon).ok()?;
    Some(PlaceCandidate {
        name: place.names[0].to_string(),
        region: place.region.to_string(),
        coordinate,
        aliases: place.names[1..].iter().map(|s| s.to_string()).collect(),
    })
}

impl Gazetteer {
    pub fn new(places: Vec<PlaceCandidate>) -> Self {
        Self { places }
    }

    /// The built-in table, materialised once per process.
    pub fn builtin() -> Arc<Gazetteer> {
        static BUILTIN: OnceLock<Arc<Gazetteer>> = OnceLock::new();
        let shared = BUILTIN.get_or_init(|| {
            Arc::new(Gazetteer::new(BUILTIN_PLACES.iter().filter_map(builtin_to_candidate).collect()))
        });
        Arc::clone(shared)
    }

    /// Load a JSON array of places.
    pub fn load_from(path: &Path) -> Result<Self, GazetteerError> {
        let data = fs::read_to_string(path)?;
        let places: Vec<PlaceCandidate> = serde_json::from_str(&data)?;
        if places.is_empty() {
            return Err(GazetteerError::Empty);
        }
        Ok(Self::new(places))
    }

    pub fn places(&self) -> &[PlaceCandidate] {
        &self.places
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Closest place by degree-space distance, with that distance.
    pub fn nearest(&self, coordinate: &Coordinate) -> Option<(&PlaceCandidate, f64)> {
        self.places
            .iter()
            .map(|p| (p, p.coordinate.degree_distance(coordinate)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Closest place strictly within `threshold` degrees.
    pub fn nearest_within(&self, coordinate: &Coordinate, threshold: f64) -> Option<&PlaceCandidate> {
        self.nearest(coordinate)
            .filter(|(_, distance)| *distance < threshold)
            .map(|(place, _)| place)
    }

    /// First place whose name or alias loosely matches `part`.
    pub fn fuzzy_find(&self, part: &str) -> Option<&PlaceCandidate> {
        let part = part.trim();
        if part.chars().count() < MIN_FUZZY_LEN {
            return None;
        }
        self.places.iter().find(|p| p.matches_loosely(part))
    }
}
