use crate::config::ConfigError;
use crate::location::{CoordinateError, GazetteerError};
use crate::telemetry::TelemetryError;

/// Failures of the `souq-locate` binary outside the location core.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("{0}")]
    Coordinate(#[from] CoordinateError),
    #[error("gazetteer error: {0}")]
    Gazetteer(#[from] GazetteerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("output error: {0}")]
    Json(#[from] serde_json::Error),
}
