use std::sync::Arc;
use std::time::{Duration, Instant};

use log::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{fetch_json, items};
use crate::autofill::normalize::{parse_date, pick_str, pick_timestamp, Highlights};
use crate::autofill::{SegmentAutofillPlan, SegmentSuggestion, SegmentType};
use crate::config::OffersProviderConfig;
use crate::SmartFillError;

pub const AMADEUS_SOURCE: &str = "amadeus";
pub const MAX_OFFERS: usize = 3;

/// Tokens are refreshed this long before the provider would reject them.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Priced flight offers from Amadeus, authenticated with client credentials.
///
/// The access token lives in process memory only. Two callers racing on an
/// expired token may both fetch a new one; the last write wins.
pub struct FlightOffersService {
    client: reqwest::Client,
    config: OffersProviderConfig,
    token: Arc<RwLock<Option<AccessToken>>>,
}

impl FlightOffersService {
    pub fn new(client: reqwest::Client, config: OffersProviderConfig) -> Self {
        FlightOffersService {
            client,
            config,
            token: Arc::new(RwLock::new(None)),
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    async fn access_token(&self) -> Result<String, SmartFillError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let (Some(client_id), Some(client_secret)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) else {
            return Err(SmartFillError::unavailable(AMADEUS_SOURCE));
        };

        trace!("Requesting a new Amadeus access token.");
        let response = self
            .client
            .post(format!("{}/v1/security/oauth2/token", self.base_url()))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| SmartFillError::request(AMADEUS_SOURCE, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SmartFillError::request(
                AMADEUS_SOURCE,
                format!("token exchange failed: {status} - {body}"),
            ));
        }
        let issued: TokenResponse = response
            .json()
            .await
            .map_err(|e| SmartFillError::request(AMADEUS_SOURCE, e))?;

        let token = AccessToken {
            value: issued.access_token,
            expires_at: Instant::now() + Duration::from_secs(issued.expires_in),
        };
        let value = token.value.clone();
        *self.token.write().await = Some(token);
        Ok(value)
    }

    /// Up to [`MAX_OFFERS`] offers, each one plan with a `create` per leg.
    pub async fn search_offers(
        &self,
        origin: &str,
        destination: &str,
        date: Option<&str>,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError> {
        if self.config.client_id.is_none() || self.config.client_secret.is_none() {
            return Err(SmartFillError::unavailable(AMADEUS_SOURCE));
        }
        let date = match date {
            None => chrono::Utc::now().date_naive(),
            Some(raw) => parse_date(raw).ok_or_else(|| {
                SmartFillError::InvalidRequest(format!("unrecognised date {raw:?}"))
            })?,
        };
        let token = self.access_token().await?;

        let max = MAX_OFFERS.to_string();
        let date = date.to_string();
        let request = self
            .client
            .get(format!("{}/v2/shopping/flight-offers", self.base_url()))
            .bearer_auth(token)
            .query(&[
                ("originLocationCode", origin),
                ("destinationLocationCode", destination),
                ("departureDate", date.as_str()),
                ("adults", "1"),
                ("max", max.as_str()),
            ]);
        let Some(payload) = fetch_json(AMADEUS_SOURCE, request).await? else {
            return Ok(Vec::new());
        };

        let carriers = payload
            .get("dictionaries")
            .and_then(|d| d.get("carriers"))
            .cloned()
            .unwrap_or(Value::Null);
        let plans: Vec<SegmentAutofillPlan> = items(&payload, &["data"])
            .iter()
            .take(MAX_OFFERS)
            .filter_map(|offer| offer_to_plan(offer, &carriers))
            .collect();
        debug!(
            "Amadeus returned {} offer plan(s) for {origin} → {destination}.",
            plans.len()
        );
        Ok(plans)
    }
}

fn carrier_name(carriers: &Value, code: Option<&str>) -> Option<String> {
    let code = code?;
    carriers
        .get(code)
        .and_then(Value::as_str)
        .map(title_case)
        .or_else(|| Some(code.to_string()))
}

/// Amadeus dictionaries shout (`"UNITED AIRLINES"`).
fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn price_label(offer: &Value) -> Option<String> {
    let total = pick_str(offer, &["price.grandTotal", "price.total"])?;
    Some(match pick_str(offer, &["price.currency"]) {
        Some(currency) => format!("{currency} {total}"),
        None => total,
    })
}

fn offer_to_plan(offer: &Value, carriers: &Value) -> Option<SegmentAutofillPlan> {
    let itinerary = offer.get("itineraries")?.as_array()?.first()?;
    let legs = itinerary.get("segments")?.as_array()?;
    let price = price_label(offer);
    let offer_id = pick_str(offer, &["id"]);
    let total = legs.len();

    let segments: Vec<SegmentSuggestion> = legs
        .iter()
        .enumerate()
        .map(|(index, leg)| {
            let mut segment = leg_to_segment(leg, carriers);
            segment.insert_metadata(
                "offer",
                json!({
                    "id": offer_id,
                    "leg_index": index,
                    "legs_total": total,
                    "price": offer.get("price"),
                }),
            );
            if index == 0 {
                if let Some(price) = &price {
                    segment
                        .highlights
                        .get_or_insert_with(Vec::new)
                        .push(crate::autofill::Highlight {
                            label: "Price".to_string(),
                            value: price.clone(),
                        });
                }
            }
            segment
        })
        .collect();

    let first = legs.first()?;
    let last = legs.last()?;
    let from = pick_str(first, &["departure.iataCode"]).unwrap_or_default();
    let to = pick_str(last, &["arrival.iataCode"]).unwrap_or_default();
    let stops = match total.saturating_sub(1) {
        0 => "Nonstop".to_string(),
        1 => "1 stop".to_string(),
        n => format!("{n} stops"),
    };
    let description = [price, pick_str(itinerary, &["duration"])]
        .into_iter()
        .flatten()
        .collect::<Vec<String>>()
        .join(" · ");
    SegmentAutofillPlan::journey(
        format!("{from} → {to} · {stops}"),
        Some(description).filter(|d| !d.is_empty()),
        segments,
    )
}

fn leg_to_segment(leg: &Value, carriers: &Value) -> SegmentSuggestion {
    let carrier_code = pick_str(leg, &["carrierCode", "operating.carrierCode"]);
    let number = pick_str(leg, &["number"]);
    let code = match (&carrier_code, &number) {
        (Some(carrier), Some(number)) => Some(format!("{carrier}{number}")),
        _ => number.clone(),
    };
    let from = pick_str(leg, &["departure.iataCode"]);
    let to = pick_str(leg, &["arrival.iataCode"]);
    let airline = carrier_name(carriers, carrier_code.as_deref());

    let mut segment = SegmentSuggestion::new(SegmentType::Flight, AMADEUS_SOURCE);
    segment.title = match (&code, &from, &to) {
        (Some(code), Some(from), Some(to)) => Some(format!("{code} · {from} → {to}")),
        (Some(code), _, _) => Some(code.clone()),
        _ => None,
    };
    segment.location_name = from.clone();
    segment.start_time = pick_timestamp(leg, &["departure.at"]);
    segment.end_time = pick_timestamp(leg, &["arrival.at"]);
    segment.provider_name = airline.clone();
    segment.transport_number = code;
    segment.insert_metadata(
        "departure",
        json!({
            "iata": from,
            "terminal": pick_str(leg, &["departure.terminal"]),
            "time": segment.start_time,
            "local_time": pick_str(leg, &["departure.at"]),
        }),
    );
    segment.insert_metadata(
        "arrival",
        json!({
            "iata": to,
            "terminal": pick_str(leg, &["arrival.terminal"]),
            "time": segment.end_time,
            "local_time": pick_str(leg, &["arrival.at"]),
        }),
    );

    let mut highlights = Highlights::default();
    highlights
        .push("Departure", from)
        .push("Arrival", to)
        .push("Airline", airline)
        .push("Departure terminal", pick_str(leg, &["departure.terminal"]))
        .push("Arrival terminal", pick_str(leg, &["arrival.terminal"]));
    segment.highlights = highlights.finish();
    segment
}
