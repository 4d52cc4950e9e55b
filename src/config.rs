//! Runtime configuration from `.env` and the process environment.

use crate::location::cache::FileAddressCache;
use crate::location::geocoder::NOMINATIM_REVERSE_URL;
use crate::location::resolver::ResolverConfig;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration for the binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub locator: LocatorConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = get("APP_HOST", "127.0.0.1");
        let port = get("APP_PORT", "8080")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;
        let log_level = get("APP_LOG_LEVEL", "info");

        let country = get("LOCATOR_COUNTRY", "Libya").trim().to_string();
        if country.is_empty() {
            return Err(ConfigError::EmptyCountry);
        }

        let locator = LocatorConfig {
            country,
            language: get("LOCATOR_LANGUAGE", "en"),
            zoom: parse_var(&lookup, "LOCATOR_ZOOM", 14)?,
            proxy_url: get("LOCATOR_PROXY_URL", &format!("http://{}:{}/api/reverse-geocode", host, port)),
            upstream_url: get("LOCATOR_UPSTREAM_URL", NOMINATIM_REVERSE_URL),
            geocode_timeout: Duration::from_secs(parse_var(&lookup, "LOCATOR_GEOCODE_TIMEOUT_SECS", 5)?),
            cache_path: lookup("LOCATOR_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(FileAddressCache::default_path),
            cache_ttl: Duration::from_secs(3600 * parse_var::<u64>(&lookup, "LOCATOR_CACHE_TTL_HOURS", 720)?),
            gazetteer_path: lookup("LOCATOR_GAZETTEER_PATH").map(PathBuf::from),
        };

        Ok(Self {
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            locator,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Address resolution settings.
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub country: String,
    pub language: String,
    pub zoom: u8,
    /// Trusted proxy endpoint clients call for reverse geocoding.
    pub proxy_url: String,
    /// Upstream reverse-geocoding service, used only by the proxy.
    pub upstream_url: String,
    pub geocode_timeout: Duration,
    pub cache_path: PathBuf,
    pub cache_ttl: Duration,
    pub gazetteer_path: Option<PathBuf>,
}

impl LocatorConfig {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            country: self.country.clone(),
            language: self.language.clone(),
            zoom: self.zoom,
            cache_max_age: self.cache_ttl,
            ..ResolverConfig::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid u16")]
    InvalidPort,
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost { source: std::net::AddrParseError },
    #[error("{key} must be a number, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("LOCATOR_COUNTRY must not be empty")]
    EmptyCountry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.locator.country, "Libya");
        assert_eq!(config.locator.zoom, 14);
        assert_eq!(config.locator.geocode_timeout, Duration::from_secs(5));
        assert_eq!(config.locator.cache_ttl, Duration::from_secs(720 * 3600));
        assert_eq!(config.locator.proxy_url, "http://127.0.0.1:8080/api/reverse-geocode");
        assert_eq!(config.locator.upstream_url, NOMINATIM_REVERSE_URL);
        assert!(config.locator.gazetteer_path.is_none());
    }

    #[test]
    fn test_overrides_are_read() {
        let config = load(&[
            ("APP_PORT", "9000"),
            ("LOCATOR_COUNTRY", " Tunisia "),
            ("LOCATOR_LANGUAGE", "ar"),
            ("LOCATOR_GEOCODE_TIMEOUT_SECS", "3"),
            ("LOCATOR_GAZETTEER_PATH", "/etc/souq/places.json"),
        ])
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.locator.proxy_url, "http://127.0.0.1:9000/api/reverse-geocode");

        let resolver = config.locator.resolver_config();
        assert_eq!(resolver.country, "Tunisia");
        assert_eq!(resolver.language, "ar");
        assert_eq!(config.locator.geocode_timeout, Duration::from_secs(3));
        assert_eq!(config.locator.gazetteer_path, Some(PathBuf::from("/etc/souq/places.json")));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(matches!(load(&[("APP_PORT", "not-a-port")]), Err(ConfigError::InvalidPort)));
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = load(&[("LOCATOR_ZOOM", "400")]).unwrap_err();
        assert_eq!(err.to_string(), "LOCATOR_ZOOM must be a number, got '400'");
    }

    #[test]
    fn test_empty_country_is_rejected() {
        assert!(matches!(load(&[("LOCATOR_COUNTRY", "  ")]), Err(ConfigError::EmptyCountry)));
    }

    #[test]
    fn test_localhost_maps_to_loopback() {
        let server = ServerConfig { host: "localhost".into(), port: 8080 };
        assert_eq!(server.socket_addr().unwrap(), "127.0.0.1:8080".parse().unwrap());

        let bad = ServerConfig { host: "not-an-ip".into(), port: 8080 };
        assert!(matches!(bad.socket_addr(), Err(ConfigError::InvalidHost { .. })));
    }
}
