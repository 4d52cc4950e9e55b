//! Reverse geocoding: the trusted proxy client and the upstream client the
//! proxy itself uses.

use super::types::Coordinate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;

pub const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocodeRequest {
    pub lat: f64,
    pub lon: f64,
    pub language: String,
    pub zoom: u8,
}

impl ReverseGeocodeRequest {
    pub fn new(coordinate: &Coordinate, language: &str, zoom: u8) -> Self {
        Self {
            lat: coordinate.latitude(),
            lon: coordinate.longitude(),
            language: language.to_string(),
            zoom,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocodeResponse {
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ReverseGeocodeResponse {
    /// The display name, if present and not blank.
    pub fn usable_display_name(&self) -> Option<&str> {
        self.display_name.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, request: &ReverseGeocodeRequest) -> Result<ReverseGeocodeResponse, GeocodeError>;
}

/// Calls the internal proxy endpoint, never the upstream service.
pub struct ProxyGeocoder {
    endpoint: String,
    timeout: Duration,
}

impl ProxyGeocoder {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self { endpoint: endpoint.into(), timeout }
    }
}

#[async_trait]
impl ReverseGeocoder for ProxyGeocoder {
    async fn reverse(&self, request: &ReverseGeocodeRequest) -> Result<ReverseGeocodeResponse, GeocodeError> {
        let query = vec![
            ("lat", request.lat.to_string()),
            ("lon", request.lon.to_string()),
            ("language", request.language.clone()),
            ("zoom", request.zoom.to_string()),
        ];
        fetch_json(self.endpoint.clone(), query, Vec::new(), self.timeout).await
    }
}

/// Upstream OpenStreetMap Nominatim client. Only the proxy server talks to it.
pub struct NominatimClient {
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: format!("SouqLocator/{} (marketplace-location-proxy)", env!("CARGO_PKG_VERSION")),
            timeout,
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, request: &ReverseGeocodeRequest) -> Result<ReverseGeocodeResponse, GeocodeError> {
        let query = vec![
            ("format", "jsonv2".to_string()),
            ("lat", request.lat.to_string()),
            ("lon", request.lon.to_string()),
            ("zoom", request.zoom.to_string()),
            ("accept-language", request.language.clone()),
        ];
        let headers = vec![("User-Agent", self.user_agent.clone())];
        fetch_json(self.base_url.clone(), query, headers, self.timeout).await
    }
}

/// Blocking `ureq` GET on the blocking pool, bounded twice: by the agent
/// timeout and by an outer tokio timeout.
async fn fetch_json(
    url: String,
    query: Vec<(&'static str, String)>,
    headers: Vec<(&'static str, String)>,
    timeout: Duration,
) -> Result<ReverseGeocodeResponse, GeocodeError> {
    let call = tokio::task::spawn_blocking(move || {
        let mut req = ureq::get(&url).timeout(timeout);
        for (name, value) in &headers {
            req = req.set(name, value);
        }
        for (key, value) in &query {
            req = req.query(key, value);
        }

        let response = req.call().map_err(|e| match e {
            ureq::Error::Status(code, _) => GeocodeError::Status(code),
            ureq::Error::Transport(t) if is_timeout(&t) => GeocodeError::Timeout(timeout),
            other => GeocodeError::Network(other.to_string()),
        })?;

        response.into_json::<ReverseGeocodeResponse>().map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => GeocodeError::Timeout(timeout),
            _ => GeocodeError::InvalidResponse(e.to_string()),
        })
    });

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(GeocodeError::Network(join.to_string())),
        Err(_) => Err(GeocodeError::Timeout(timeout)),
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|e| matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_coordinate() {
        let c = Coordinate::new(32.88, 13.19).unwrap();
        let req = ReverseGeocodeRequest::new(&c, "en", 14);
        assert_eq!(req.lat, 32.88);
        assert_eq!(req.lon, 13.19);
        assert_eq!(req.language, "en");
        assert_eq!(req.zoom, 14);
    }

    #[test]
    fn test_response_missing_display_name() {
        let r: ReverseGeocodeResponse = serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert!(r.usable_display_name().is_none());
    }

    #[test]
    fn test_response_blank_display_name() {
        let r: ReverseGeocodeResponse = serde_json::from_str(r#"{"display_name": "   "}"#).unwrap();
        assert!(r.usable_display_name().is_none());
    }

    #[test]
    fn test_response_display_name_trimmed() {
        let r: ReverseGeocodeResponse =
            serde_json::from_str(r#"{"display_name": " Souq al Juma, Tripoli, Libya ", "place_id": 7}"#).unwrap();
        assert_eq!(r.usable_display_name(), Some("Souq al Juma, Tripoli, Libya"));
    }

    #[tokio::test]
    async fn test_proxy_unreachable_is_network_error() {
        // Port 9 (discard) is closed on test hosts; the connect fails fast.
        let geocoder = ProxyGeocoder::new("http://127.0.0.1:9/api/reverse-geocode", Duration::from_secs(2));
        let req = ReverseGeocodeRequest::new(&Coordinate::new(25.0, 18.0).unwrap(), "en", 14);
        let err = geocoder.reverse(&req).await.unwrap_err();
        assert!(matches!(err, GeocodeError::Network(_) | GeocodeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_hanging_proxy_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            // Accept and hold the connection without ever answering.
            if let Ok((stream, _)) = listener.accept() {
                std::thread::sleep(Duration::from_secs(10));
                drop(stream);
            }
        });

        let timeout = Duration::from_secs(1);
        let geocoder = ProxyGeocoder::new(format!("http://{}/api/reverse-geocode", addr), timeout);
        let req = ReverseGeocodeRequest::new(&Coordinate::new(25.0, 18.0).unwrap(), "en", 14);

        let started = std::time::Instant::now();
        let err = geocoder.reverse(&req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, GeocodeError::Timeout(t) if t == timeout), "got {:?}", err);
        assert!(elapsed >= Duration::from_millis(900), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "returned after {:?}", elapsed);
    }
}
