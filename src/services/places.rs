use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use serde_json::{json, Value};

use super::geocoding::{BoundingBox, GeocodingService, DEFAULT_RADIUS_METERS, NOMINATIM_SOURCE};
use super::{fetch_json, first_item, AutofillProvider, Place};
use crate::autofill::normalize::{pick_decimal, pick_str, Highlights};
use crate::autofill::{
    AutofillKind, AutofillRequest, GeoContext, SegmentAutofillPlan, SegmentSuggestion,
    SegmentType,
};
use crate::config::PlacesProviderConfig;
use crate::SmartFillError;

pub const FOURSQUARE_SOURCE: &str = "foursquare";

const FOURSQUARE_FIELDS: &str =
    "fsq_id,name,location,geocodes,categories,timezone,website,tel,distance";

/// Foursquare top-level category ids.
fn foursquare_category(category: SegmentType) -> Option<&'static str> {
    match category {
        SegmentType::Hotel => Some("19014"),
        SegmentType::Meal => Some("13065"),
        SegmentType::Activity => Some("10000"),
        _ => None,
    }
}

/// Best-guess place lookup: a keyed category search first, the keyless
/// geocoder when that is not configured or finds nothing.
pub struct PlaceSearchService {
    client: reqwest::Client,
    config: PlacesProviderConfig,
    geocoder: Arc<dyn GeocodingService>,
}

impl PlaceSearchService {
    pub fn new(
        client: reqwest::Client,
        config: PlacesProviderConfig,
        geocoder: Arc<dyn GeocodingService>,
    ) -> Self {
        PlaceSearchService {
            client,
            config,
            geocoder,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        category: SegmentType,
        context: Option<&GeoContext>,
    ) -> Result<Option<SegmentAutofillPlan>, SmartFillError> {
        if foursquare_category(category).is_none() {
            return Err(SmartFillError::InvalidRequest(format!(
                "{category} is not a place category"
            )));
        }
        if let Some(api_key) = self.config.api_key.as_deref() {
            // Errors from the keyed tier propagate; only an empty answer falls through.
            if let Some(plan) = self.search_primary(api_key, query, category, context).await? {
                return Ok(Some(plan));
            }
            debug!("Foursquare found nothing for {query:?}, trying the geocoder.");
        }
        self.search_fallback(query, category, context).await
    }

    /// The keyless tier on its own.
    pub async fn search_fallback(
        &self,
        query: &str,
        category: SegmentType,
        context: Option<&GeoContext>,
    ) -> Result<Option<SegmentAutofillPlan>, SmartFillError> {
        let bounds = BoundingBox::from_context(context);
        let Some(place) = self.geocoder.geocode(query, bounds.as_ref()).await? else {
            return Ok(None);
        };
        Ok(Some(plan_for(suggestion_from_geocoder(&place, category))))
    }

    async fn search_primary(
        &self,
        api_key: &str,
        query: &str,
        category: SegmentType,
        context: Option<&GeoContext>,
    ) -> Result<Option<SegmentAutofillPlan>, SmartFillError> {
        let mut params = vec![
            ("query", query.to_string()),
            ("limit", "1".to_string()),
            ("fields", FOURSQUARE_FIELDS.to_string()),
        ];
        if let Some(categories) = foursquare_category(category) {
            params.push(("categories", categories.to_string()));
        }
        if let Some((lat, lng)) = context.and_then(|c| Some((c.lat?, c.lng?))) {
            let radius = context
                .and_then(|c| c.radius_meters)
                .unwrap_or(DEFAULT_RADIUS_METERS);
            params.push(("ll", format!("{lat},{lng}")));
            params.push(("radius", format!("{}", radius.round() as i64)));
            params.push(("sort", "RELEVANCE".to_string()));
        }

        let request = self
            .client
            .get(format!(
                "{}/v3/places/search",
                self.config.base_url.trim_end_matches('/')
            ))
            .header(reqwest::header::AUTHORIZATION, api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&params);
        let Some(payload) = fetch_json(FOURSQUARE_SOURCE, request).await? else {
            return Ok(None);
        };
        Ok(first_item(&payload, &["results"])
            .map(|result| plan_for(suggestion_from_foursquare(result, category))))
    }
}

#[async_trait]
impl AutofillProvider for PlaceSearchService {
    fn name(&self) -> &'static str {
        FOURSQUARE_SOURCE
    }

    async fn autofill(
        &self,
        request: &AutofillRequest,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError> {
        let category = request.kind.place_category().ok_or_else(|| {
            SmartFillError::InvalidRequest(format!("{} is not a place category", request.kind))
        })?;
        let context = request.context.as_ref();
        let plan = if request.metadata_str("source") == Some(NOMINATIM_SOURCE) {
            self.search_fallback(&request.query, category, context).await?
        } else {
            self.search(&request.query, category, context).await?
        };
        Ok(plan.into_iter().collect())
    }
}

fn plan_for(segment: SegmentSuggestion) -> SegmentAutofillPlan {
    let title = segment
        .title
        .clone()
        .unwrap_or_else(|| segment.segment_type.to_string());
    SegmentAutofillPlan::single(title, segment.location_address.clone(), segment)
}

fn suggestion_from_foursquare(result: &Value, category: SegmentType) -> SegmentSuggestion {
    let mut segment = SegmentSuggestion::new(category, FOURSQUARE_SOURCE);
    let name = pick_str(result, &["name"]);
    let address = pick_str(result, &["location.formatted_address"]).or_else(|| {
        let parts: Vec<String> = ["location.address", "location.locality", "location.country"]
            .iter()
            .filter_map(|path| pick_str(result, &[*path]))
            .collect();
        Some(parts.join(", ")).filter(|joined| !joined.is_empty())
    });
    let kind = pick_str(result, &["categories.0.name"]);

    segment.title = name.clone();
    segment.location_name = name;
    segment.location_address = address.clone();
    segment.location_lat = pick_decimal(result, &["geocodes.main.latitude", "latitude"]);
    segment.location_lng = pick_decimal(result, &["geocodes.main.longitude", "longitude"]);
    segment.timezone = pick_str(result, &["timezone"]);
    segment.insert_metadata("fsq_id", json!(pick_str(result, &["fsq_id"])));
    segment.insert_metadata("categories", result.get("categories").cloned().unwrap_or(Value::Null));
    segment.insert_metadata("website", json!(pick_str(result, &["website"])));
    segment.insert_metadata("tel", json!(pick_str(result, &["tel"])));

    let mut highlights = Highlights::default();
    highlights
        .push("Address", address)
        .push("Category", kind)
        .push(
            "Distance",
            pick_str(result, &["distance"]).map(|meters| format!("{meters} m")),
        );
    segment.highlights = highlights.finish();
    segment
}

fn suggestion_from_geocoder(place: &Place, category: SegmentType) -> SegmentSuggestion {
    let mut segment = SegmentSuggestion::new(category, NOMINATIM_SOURCE);
    segment.title = Some(place.name.clone());
    segment.location_name = Some(place.name.clone());
    segment.location_address = place.address.clone();
    segment.location_lat = place.coordinates.as_ref().map(|c| c.lat);
    segment.location_lng = place.coordinates.as_ref().map(|c| c.lng);
    segment.insert_metadata("place_id", json!(pick_str(&place.raw, &["place_id"])));
    segment.insert_metadata("osm_type", json!(pick_str(&place.raw, &["osm_type"])));
    segment.insert_metadata("category", json!(place.category));

    let mut highlights = Highlights::default();
    highlights
        .push("Address", place.address.clone())
        .push("Category", place.category.clone());
    segment.highlights = highlights.finish();
    segment
}

/// Kinds answered by place search.
pub const PLACE_KINDS: [AutofillKind; 3] =
    [AutofillKind::Hotel, AutofillKind::Meal, AutofillKind::Activity];
