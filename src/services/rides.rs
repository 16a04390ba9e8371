use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use serde_json::json;

use super::geocoding::{GeocodingService, NOMINATIM_SOURCE};
use super::{split_pair, AutofillProvider, Place};
use crate::autofill::normalize::{normalize_timestamp, Highlights};
use crate::autofill::{AutofillRequest, SegmentAutofillPlan, SegmentSuggestion, SegmentType};
use crate::SmartFillError;

pub const RIDE_SOURCE: &str = "ride";

/// Point-to-point rides. Both ends are geocoded; no routing engine is
/// consulted, so a ride never carries an end time.
pub struct RideService {
    geocoder: Arc<dyn GeocodingService>,
}

impl RideService {
    pub fn new(geocoder: Arc<dyn GeocodingService>) -> Self {
        RideService { geocoder }
    }

    async fn resolve(&self, query: &str) -> Option<Place> {
        match self.geocoder.geocode(query, None).await {
            Ok(place) => place,
            Err(e) => {
                warn!("Could not resolve ride endpoint {query:?}: {e}");
                None
            }
        }
    }

    pub async fn plan_ride(
        &self,
        origin: &str,
        destination: &str,
        start: Option<&str>,
    ) -> Option<SegmentAutofillPlan> {
        let (from, to) = tokio::join!(self.resolve(origin), self.resolve(destination));
        if from.is_none() && to.is_none() {
            debug!("Neither ride endpoint resolved.");
            return None;
        }
        let segment = ride_suggestion(origin, from.as_ref(), destination, to.as_ref(), start);
        let title = segment.title.clone().unwrap_or_else(|| "Ride".to_string());
        Some(SegmentAutofillPlan::single(title, None, segment))
    }
}

#[async_trait]
impl AutofillProvider for RideService {
    fn name(&self) -> &'static str {
        RIDE_SOURCE
    }

    async fn autofill(
        &self,
        request: &AutofillRequest,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError> {
        let (origin, destination) = split_pair(&request.query, &["/", " to ", "→"])
            .ok_or_else(|| {
                SmartFillError::InvalidRequest(
                    "a ride needs \"origin / destination\" or \"origin to destination\""
                        .to_string(),
                )
            })?;
        Ok(self
            .plan_ride(&origin, &destination, request.date.as_deref())
            .await
            .into_iter()
            .collect())
    }
}

fn endpoint_label(raw: &str, place: Option<&Place>) -> String {
    place
        .map(|place| place.name.clone())
        .unwrap_or_else(|| raw.trim().to_string())
}

fn endpoint_metadata(raw: &str, place: Option<&Place>) -> serde_json::Value {
    json!({
        "query": raw,
        "name": place.map(|p| &p.name),
        "address": place.and_then(|p| p.address.as_ref()),
        "coordinates": place.and_then(|p| p.coordinates.as_ref()),
        "resolved": place.is_some(),
    })
}

fn ride_suggestion(
    origin: &str,
    from: Option<&Place>,
    destination: &str,
    to: Option<&Place>,
    start: Option<&str>,
) -> SegmentSuggestion {
    let from_label = endpoint_label(origin, from);
    let to_label = endpoint_label(destination, to);

    let mut segment = SegmentSuggestion::new(SegmentType::Transport, RIDE_SOURCE);
    segment.title = Some(format!("Ride: {from_label} → {to_label}"));
    segment.description = Some(format!("From {from_label} to {to_label}"));
    segment.location_name = Some(from_label.clone());
    segment.location_address = from.and_then(|p| p.address.clone());
    segment.location_lat = from.and_then(|p| p.coordinates.as_ref()).map(|c| c.lat);
    segment.location_lng = from.and_then(|p| p.coordinates.as_ref()).map(|c| c.lng);
    segment.start_time = start.and_then(normalize_timestamp);
    segment.insert_metadata("geocoder", json!(NOMINATIM_SOURCE));
    segment.insert_metadata("origin", endpoint_metadata(origin, from));
    segment.insert_metadata("destination", endpoint_metadata(destination, to));

    let mut highlights = Highlights::default();
    highlights
        .push("Pickup", Some(from.and_then(|p| p.address.clone()).unwrap_or(from_label)))
        .push("Drop-off", Some(to.and_then(|p| p.address.clone()).unwrap_or(to_label)));
    segment.highlights = highlights.finish();
    segment
}
