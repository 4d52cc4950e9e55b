//! Trusted HTTP proxy and location API.
//!
//! Clients never reach the reverse-geocoding service directly; they call
//! `/api/reverse-geocode` here, which forwards to the configured upstream.

mod handlers;
mod state;

pub use state::AppState;

use crate::config::LocatorConfig;
use crate::location::{
    AddressResolver, FileAddressCache, Gazetteer, LocationAcquirer, LocationService, NoDevice, NominatimClient,
};
use axum::http::{header, HeaderValue};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

impl AppState {
    /// Wire the proxy against the upstream service named in `config`.
    pub fn from_config(config: &LocatorConfig, gazetteer: Arc<Gazetteer>) -> Self {
        let upstream = Arc::new(NominatimClient::new(config.upstream_url.clone(), config.geocode_timeout));
        let cache = Arc::new(FileAddressCache::load_from(config.cache_path.clone()).with_ttl(config.cache_ttl));
        let resolver = AddressResolver::new(gazetteer, upstream.clone(), config.resolver_config()).with_cache(cache);
        let service = LocationService::new(LocationAcquirer::new(Arc::new(NoDevice)), resolver);

        Self {
            upstream,
            service,
            language: config.language.clone(),
            zoom: config.zoom,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/reverse-geocode", get(handlers::reverse_geocode))
        .route("/api/resolve", get(handlers::resolve))
        .route("/api/places", get(handlers::places))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Souq locator listening");
    axum::serve(listener, app).await
}
