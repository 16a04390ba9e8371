use super::{fetch_json, first_item, Coordinates, Place};

use crate::autofill::normalize::{pick_decimal, pick_str};
use crate::autofill::GeoContext;
use crate::config::GeocoderConfig;
use crate::SmartFillError;

use async_trait::async_trait;
use log::*;
use reqwest::header::USER_AGENT;

pub const NOMINATIM_SOURCE: &str = "nominatim";

/// Rough length of one degree of latitude, used for bounding boxes.
pub const METERS_PER_DEGREE: f64 = 111_320.0;
pub const DEFAULT_RADIUS_METERS: f64 = 5_000.0;

#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Best match for `query`, optionally restricted to `bounds`.
    async fn geocode(
        &self,
        query: &str,
        bounds: Option<&BoundingBox>,
    ) -> Result<Option<Place>, SmartFillError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lng: f64, radius_meters: f64) -> Self {
        let delta = radius_meters / METERS_PER_DEGREE;
        BoundingBox {
            min_lat: lat - delta,
            min_lng: lng - delta,
            max_lat: lat + delta,
            max_lng: lng + delta,
        }
    }

    /// `None` unless the context carries both coordinates.
    pub fn from_context(context: Option<&GeoContext>) -> Option<Self> {
        let context = context?;
        let radius = context
            .radius_meters
            .filter(|radius| *radius > 0.0)
            .unwrap_or(DEFAULT_RADIUS_METERS);
        Some(Self::around(context.lat?, context.lng?, radius))
    }

    /// Nominatim `viewbox` order: left, top, right, bottom.
    pub fn viewbox(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lng, self.max_lat, self.max_lng, self.min_lat
        )
    }
}

/// Keyless OpenStreetMap search.
pub struct NominatimService {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimService {
    pub fn new(client: reqwest::Client, config: &GeocoderConfig) -> Self {
        NominatimService {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[async_trait]
impl GeocodingService for NominatimService {
    async fn geocode(
        &self,
        query: &str,
        bounds: Option<&BoundingBox>,
    ) -> Result<Option<Place>, SmartFillError> {
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "jsonv2".to_string()),
            ("limit", "1".to_string()),
            ("addressdetails", "1".to_string()),
        ];
        if let Some(bounds) = bounds {
            params.push(("viewbox", bounds.viewbox()));
            params.push(("bounded", "1".to_string()));
        }

        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .header(USER_AGENT, &self.user_agent)
            .query(&params);
        let Some(payload) = fetch_json(NOMINATIM_SOURCE, request).await? else {
            return Ok(None);
        };
        let Some(result) = first_item(&payload, &[]) else {
            trace!("Nominatim returned no results for {query:?}.");
            return Ok(None);
        };
        trace!("Received place from Nominatim search.");
        Ok(place_from_nominatim(result))
    }
}

fn place_from_nominatim(result: &serde_json::Value) -> Option<Place> {
    let address = pick_str(result, &["display_name"]);
    let name = pick_str(result, &["name"]).or_else(|| {
        address
            .as_deref()
            .and_then(|display| display.split(',').next())
            .map(|first| first.trim().to_string())
    })?;
    let coordinates = match (
        pick_decimal(result, &["lat"]),
        pick_decimal(result, &["lon", "lng"]),
    ) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        _ => None,
    };
    Some(Place {
        name,
        address,
        coordinates,
        category: pick_str(result, &["type", "category", "class"]),
        raw: result.clone(),
    })
}
