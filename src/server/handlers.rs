use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::location::geocoder::{ReverseGeocodeRequest, ReverseGeocodeResponse};
use crate::location::{Coordinate, PlaceCandidate, ResolvedLocation};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

fn coordinate_param(lat: Option<f64>, lon: Option<f64>) -> Result<Coordinate, ApiError> {
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(api_error(StatusCode::BAD_REQUEST, "Provide 'lat' and 'lon' parameters"));
    };
    Coordinate::new(lat, lon).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Nominatim accepts zoom levels 0 (country) through 18 (building).
const MAX_ZOOM: u8 = 18;

fn zoom_param(raw: Option<&str>, default: u8) -> Result<u8, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u8>() {
        Ok(zoom) if zoom <= MAX_ZOOM => Ok(zoom),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("'zoom' must be an integer between 0 and {}, got '{}'", MAX_ZOOM, raw),
        )),
    }
}

// ─── GET /api/reverse-geocode ────────────────────────────────────

#[derive(Deserialize)]
pub struct ReverseQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub language: Option<String>,
    pub zoom: Option<String>,
}

pub async fn reverse_geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReverseQuery>,
) -> Result<Json<ReverseGeocodeResponse>, ApiError> {
    let start = Instant::now();
    let coordinate = coordinate_param(params.lat, params.lon)?;
    let zoom = zoom_param(params.zoom.as_deref(), state.zoom)?;

    let language = params.language.as_deref().unwrap_or(&state.language);
    let request = ReverseGeocodeRequest::new(&coordinate, language, zoom);

    let response = state.upstream.reverse(&request).await.map_err(|e| {
        tracing::warn!(%coordinate, error = %e, "upstream reverse geocode failed");
        api_error(StatusCode::BAD_GATEWAY, format!("Reverse geocoding unavailable: {}", e))
    })?;

    tracing::info!(
        %coordinate,
        found = response.display_name.is_some(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/reverse-geocode"
    );

    Ok(Json(ReverseGeocodeResponse {
        display_name: response.display_name,
    }))
}

// ─── GET /api/resolve ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ResolveQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<ResolvedLocation>, ApiError> {
    let start = Instant::now();
    let coordinate = coordinate_param(params.lat, params.lon)?;

    let resolved = state.service.resolve_manual(coordinate).await;

    tracing::info!(
        %coordinate,
        address = %resolved.display_address,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/resolve"
    );

    Ok(Json(resolved))
}

// ─── GET /api/places ─────────────────────────────────────────────

pub async fn places(State(state): State<Arc<AppState>>) -> Json<Vec<PlaceCandidate>> {
    Json(state.service.resolver().gazetteer().places().to_vec())
}

#[cfg(test)]
mod tests {
    use crate::location::geocoder::{GeocodeError, ReverseGeocodeRequest, ReverseGeocodeResponse};
    use crate::location::{
        AddressResolver, Gazetteer, LocationAcquirer, LocationService, NoDevice, ResolverConfig, ReverseGeocoder,
    };
    use crate::server::{build_router, AppState};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StubUpstream {
        display: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReverseGeocoder for StubUpstream {
        async fn reverse(&self, request: &ReverseGeocodeRequest) -> Result<ReverseGeocodeResponse, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.language, "en");
            match self.display {
                Some(d) => Ok(ReverseGeocodeResponse { display_name: Some(d.into()) }),
                None => Err(GeocodeError::Status(503)),
            }
        }
    }

    fn app(display: Option<&'static str>) -> (axum::Router, Arc<StubUpstream>) {
        let upstream = Arc::new(StubUpstream { display, calls: AtomicUsize::new(0) });
        let resolver = AddressResolver::new(Gazetteer::builtin(), upstream.clone(), ResolverConfig::default());
        let state = Arc::new(AppState {
            upstream: upstream.clone(),
            service: LocationService::new(LocationAcquirer::new(Arc::new(NoDevice)), resolver),
            language: "en".into(),
            zoom: 14,
        });
        (build_router(state), upstream)
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let cache_control = response
            .headers()
            .get(header::CACHE_CONTROL)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, cache_control, body)
    }

    #[tokio::test]
    async fn test_reverse_geocode_forwards_to_upstream() {
        let (app, upstream) = app(Some("Hay al Andalus, Tripoli, Libya"));
        let (status, cache_control, body) = get(app, "/api/reverse-geocode?lat=32.87&lon=13.12").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache_control.as_deref(), Some("no-store"));
        assert_eq!(body["display_name"], "Hay al Andalus, Tripoli, Libya");
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reverse_geocode_upstream_failure_is_bad_gateway() {
        let (app, _) = app(None);
        let (status, _, body) = get(app, "/api/reverse-geocode?lat=25.5&lon=18.5").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], 502);
    }

    #[tokio::test]
    async fn test_reverse_geocode_rejects_invalid_coordinates() {
        let (app, upstream) = app(Some("unused"));
        let (status, _, _) = get(app.clone(), "/api/reverse-geocode?lat=95&lon=13").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = get(app, "/api/reverse-geocode?lat=32.8").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reverse_geocode_rejects_bad_zoom_with_json() {
        let (app, upstream) = app(Some("unused"));
        for uri in [
            "/api/reverse-geocode?lat=32.87&lon=13.12&zoom=400",
            "/api/reverse-geocode?lat=32.87&lon=13.12&zoom=19",
            "/api/reverse-geocode?lat=32.87&lon=13.12&zoom=street",
        ] {
            let (status, _, body) = get(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["code"], 400, "{}", uri);
            assert!(body["error"].as_str().unwrap().contains("zoom"), "{}", uri);
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reverse_geocode_accepts_explicit_zoom() {
        let (app, upstream) = app(Some("Tripoli, Libya"));
        let (status, _, _) = get(app, "/api/reverse-geocode?lat=32.87&lon=13.12&zoom=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_uses_gazetteer_first() {
        let (app, upstream) = app(None);
        let (status, _, body) = get(app, "/api/resolve?lat=32.88&lon=13.19").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_address"], "Tripoli, Tripolitania, Libya");
        assert_eq!(body["source"], "gazetteer");
        assert!(body.get("tier").is_none());
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_band() {
        let (app, _) = app(None);
        let (status, _, body) = get(app, "/api/resolve?lat=25.5&lon=18.5").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_address"], "Southern region, Libya (25.5000, 18.5000)");
        assert_eq!(body["source"], "coordinate_band");
    }

    #[tokio::test]
    async fn test_places_lists_the_gazetteer() {
        let (app, _) = app(None);
        let (status, _, body) = get(app, "/api/places").await;

        assert_eq!(status, StatusCode::OK);
        let places = body.as_array().unwrap();
        assert_eq!(places.len(), Gazetteer::builtin().len());
        assert_eq!(places[0]["name"], "Tripoli");
    }
}
