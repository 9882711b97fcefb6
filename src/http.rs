//! HTTP clients for the planner's external collaborators.
//!
//! - Walking routes from an OSRM-style routing service (pedestrian profile)
//! - POI detail enrichment from a reverse-geocoding service
//!
//! Both collaborators are best-effort: transport errors, non-success
//! statuses, and unreadable bodies are logged and surface as `None`, never
//! as errors, so stage computation and detour planning continue in
//! degraded mode. POI-detail lookups are cached per rounded coordinate,
//! and failures are cached as "no data" to avoid repeating a failing
//! lookup.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{PlannerError, Result};
use crate::poi::RouteProvider;
use crate::{DetourInfo, LatLon};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Rounding scale for POI-detail cache keys; 5 decimals is roughly 1 m.
const DETAIL_CACHE_SCALE: f64 = 1e5;

// ============================================================================
// Routing client
// ============================================================================

/// OSRM-style routing response
#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: [lon, lat]
    coordinates: Vec<[f64; 2]>,
}

fn osrm_to_detour(route: OsrmRoute) -> DetourInfo {
    DetourInfo {
        coordinates: route
            .geometry
            .coordinates
            .iter()
            .map(|c| LatLon::new(c[1], c[0]))
            .collect(),
        distance_km: route.distance / 1000.0,
        duration_seconds: Some(route.duration),
    }
}

/// Walking-route client against an OSRM-style service.
pub struct RoutingClient {
    client: Client,
    base_url: String,
}

impl RoutingClient {
    /// Create a routing client for the given service base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PlannerError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RouteProvider for RoutingClient {
    async fn walking_route(&self, from: LatLon, to: LatLon) -> Option<DetourInfo> {
        let url = format!(
            "{}/route/v1/foot/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, from.lon, from.lat, to.lon, to.lat
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Routing request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Routing service returned {}", response.status());
            return None;
        }

        let body: OsrmResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Unreadable routing response: {}", e);
                return None;
            }
        };

        if body.code != "Ok" {
            debug!("No walking route ({})", body.code);
            return None;
        }

        body.routes.into_iter().next().map(osrm_to_detour)
    }
}

// ============================================================================
// POI details client
// ============================================================================

/// Enrichment fields for a point of interest. All optional; an empty
/// record is a valid "nothing known" answer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoiDetails {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    #[serde(default)]
    extratags: Option<ExtraTags>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtraTags {
    phone: Option<String>,
    website: Option<String>,
    opening_hours: Option<String>,
    description: Option<String>,
}

fn reverse_to_details(response: ReverseResponse) -> PoiDetails {
    let tags = response.extratags.unwrap_or_default();
    PoiDetails {
        address: response.display_name,
        phone: tags.phone,
        website: tags.website,
        opening_hours: tags.opening_hours,
        description: tags.description,
    }
}

fn detail_cache_key(lat: f64, lon: f64) -> (i64, i64) {
    (
        (lat * DETAIL_CACHE_SCALE).round() as i64,
        (lon * DETAIL_CACHE_SCALE).round() as i64,
    )
}

/// Process-wide POI-detail cache keyed by rounded coordinates. `None`
/// entries record failed lookups so they are not retried.
static DETAIL_CACHE: Lazy<Mutex<HashMap<(i64, i64), Option<PoiDetails>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// POI-detail enrichment client against a reverse-geocoding service.
pub struct PoiDetailsClient {
    client: Client,
    base_url: String,
}

impl PoiDetailsClient {
    /// Create a details client for the given service base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PlannerError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch details for a coordinate, consulting the cache first.
    pub async fn details(&self, lat: f64, lon: f64) -> Option<PoiDetails> {
        let key = detail_cache_key(lat, lon);

        if let Some(cached) = DETAIL_CACHE.lock().await.get(&key) {
            debug!("POI-detail cache hit for {:?}", key);
            return cached.clone();
        }

        let fetched = self.fetch(lat, lon).await;
        if fetched.is_none() {
            debug!("Caching failed POI-detail lookup for {:?}", key);
        }
        DETAIL_CACHE.lock().await.insert(key, fetched.clone());
        fetched
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Option<PoiDetails> {
        let url = format!(
            "{}/reverse?format=jsonv2&lat={}&lon={}",
            self.base_url, lat, lon
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("POI-detail request failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("POI-detail service returned {}", response.status());
            return None;
        }

        match response.json::<ReverseResponse>().await {
            Ok(body) => Some(reverse_to_details(body)),
            Err(e) => {
                warn!("Unreadable POI-detail response: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osrm_response_mapping() {
        let json = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 1234.5,
                "duration": 900.0,
                "geometry": {"coordinates": [[11.0, 47.0], [11.01, 47.005]]}
            }]
        }"#;
        let body: OsrmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.code, "Ok");

        let leg = osrm_to_detour(body.routes.into_iter().next().unwrap());
        assert!((leg.distance_km - 1.2345).abs() < 1e-9);
        assert_eq!(leg.duration_seconds, Some(900.0));
        // GeoJSON lon/lat order flipped into lat/lon
        assert_eq!(leg.coordinates[0], LatLon::new(47.0, 11.0));
    }

    #[test]
    fn test_osrm_no_route_code() {
        let json = r#"{"code": "NoRoute"}"#;
        let body: OsrmResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.code, "NoRoute");
        assert!(body.routes.is_empty());
    }

    #[test]
    fn test_reverse_response_mapping() {
        let json = r#"{
            "display_name": "Gasthof Post, Obernberg am Brenner, Tirol",
            "extratags": {"phone": "+43 1234", "opening_hours": "Mo-Su 08:00-22:00"}
        }"#;
        let body: ReverseResponse = serde_json::from_str(json).unwrap();
        let details = reverse_to_details(body);

        assert!(details.address.as_deref().unwrap().contains("Gasthof Post"));
        assert_eq!(details.phone.as_deref(), Some("+43 1234"));
        assert!(details.website.is_none());
    }

    #[test]
    fn test_reverse_response_without_tags() {
        let body: ReverseResponse = serde_json::from_str(r#"{"display_name": "Somewhere"}"#).unwrap();
        let details = reverse_to_details(body);
        assert_eq!(details.address.as_deref(), Some("Somewhere"));
        assert!(details.phone.is_none());
    }

    #[test]
    fn test_detail_cache_key_rounding() {
        // Within ~1 m the key collapses to the same cell
        assert_eq!(
            detail_cache_key(47.000001, 11.000001),
            detail_cache_key(47.000004, 11.000004)
        );
        assert_ne!(detail_cache_key(47.0, 11.0), detail_cache_key(47.001, 11.0));
    }

    #[test]
    fn test_clients_construct_without_network() {
        assert!(RoutingClient::new("https://router.example.com/").is_ok());
        assert!(PoiDetailsClient::new("https://geocode.example.com").is_ok());
    }
}
