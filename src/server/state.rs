use crate::location::{LocationService, ReverseGeocoder};
use std::sync::Arc;

pub struct AppState {
    /// Upstream reverse geocoder the proxy route forwards to.
    pub upstream: Arc<dyn ReverseGeocoder>,
    /// Manual-pin resolution inside the trusted context.
    pub service: LocationService,
    pub language: String,
    pub zoom: u8,
}
