use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use log::*;
use serde_json::{json, Value};

use super::{fetch_json, first_item, items, split_pair, AutofillProvider};
use crate::autofill::normalize::{
    format_utc, labelled_code, parse_date, pick, pick_decimal, pick_str, pick_timestamp,
    Highlights,
};
use crate::autofill::{
    AutofillRequest, SegmentAutofillPlan, SegmentSuggestion, SegmentType,
};
use crate::config::FlightProviderConfig;
use crate::services::offers::FlightOffersService;
use crate::SmartFillError;

pub const AERODATABOX_SOURCE: &str = "aerodatabox";
pub const MOCK_SOURCE: &str = "mock-data";
pub const MAX_ROUTE_RESULTS: usize = 3;

const DEPARTURE_KEYS: &[&str] = &["departure", "origin"];
const ARRIVAL_KEYS: &[&str] = &["arrival", "destination"];
const AIRPORT_KEYS: &[&str] = &["airport", "airportInfo"];
const TIME_KEYS: &[&str] = &[
    "scheduledTimeLocal",
    "scheduledTimeUtc",
    "scheduledTime.local",
    "scheduledTime.utc",
    "revisedTime.local",
    "revisedTime.utc",
    "actualTimeLocal",
    "actualTimeUtc",
];

/// Flight schedule lookups against AeroDataBox.
pub struct AeroDataBoxService {
    client: reqwest::Client,
    config: FlightProviderConfig,
}

impl AeroDataBoxService {
    pub fn new(client: reqwest::Client, config: FlightProviderConfig) -> Self {
        AeroDataBoxService { client, config }
    }

    fn get(&self, api_key: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!(
                "{}{}",
                self.config.base_url.trim_end_matches('/'),
                path
            ))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", &self.config.api_host)
    }

    /// Point lookup by flight number. The date defaults to today (UTC).
    pub async fn lookup_flight(
        &self,
        code: &str,
        date: Option<&str>,
    ) -> Result<Option<SegmentAutofillPlan>, SmartFillError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(SmartFillError::unavailable(AERODATABOX_SOURCE))?;
        let date = request_date(date)?;
        let code = flight_code(code)?;

        let request = self
            .get(api_key, &format!("/flights/number/{}/{}", code, date))
            .query(&[("withAircraftImage", "false"), ("withLocation", "false")]);
        let Some(payload) = fetch_json(AERODATABOX_SOURCE, request).await? else {
            return Ok(None);
        };
        let Some(flight) = first_item(&payload, &["items", "flights"]).or_else(|| {
            pick(&payload, DEPARTURE_KEYS).map(|_| &payload)
        }) else {
            trace!("No flight record for {code} on {date}.");
            return Ok(None);
        };

        let segment = normalize_flight(flight, &code, AERODATABOX_SOURCE);
        let title = segment.title.clone().unwrap_or_else(|| code.clone());
        Ok(Some(SegmentAutofillPlan::single(
            title,
            segment.description.clone(),
            segment,
        )))
    }

    /// All departures from `origin` on `date` that land at `destination`.
    ///
    /// Never fails: without a key, on a provider error, or with no match the
    /// result is the illustrative mock set tagged [`MOCK_SOURCE`].
    pub async fn search_route(
        &self,
        origin: &str,
        destination: &str,
        date: Option<&str>,
    ) -> Vec<SegmentAutofillPlan> {
        let origin = origin.trim().to_uppercase();
        let destination = destination.trim().to_uppercase();
        let date = date
            .and_then(parse_date)
            .unwrap_or_else(|| Utc::now().date_naive());

        let Some(api_key) = self.config.api_key.as_deref() else {
            debug!("AeroDataBox key missing, serving mock routes.");
            return mock_route_plans(&origin, &destination, date);
        };

        match self.departures(api_key, &origin, date).await {
            Ok(departures) => {
                let plans: Vec<SegmentAutofillPlan> = departures
                    .iter()
                    .filter_map(|entry| board_entry_to_flight(entry, &origin))
                    .filter(|flight| lands_at(flight, &destination))
                    .take(MAX_ROUTE_RESULTS)
                    .enumerate()
                    .map(|(index, flight)| {
                        let segment = normalize_flight(&flight, "", AERODATABOX_SOURCE);
                        SegmentAutofillPlan::single(
                            option_title(index),
                            segment.title.clone(),
                            segment,
                        )
                    })
                    .collect();
                if plans.is_empty() {
                    debug!("No {origin} → {destination} flights on {date}, serving mock routes.");
                    mock_route_plans(&origin, &destination, date)
                } else {
                    plans
                }
            }
            Err(e) => {
                warn!("Route search failed, serving mock routes: {e}");
                mock_route_plans(&origin, &destination, date)
            }
        }
    }

    /// The provider caps one window at 12 hours, so a day is two requests.
    async fn departures(
        &self,
        api_key: &str,
        origin: &str,
        date: NaiveDate,
    ) -> Result<Vec<Value>, SmartFillError> {
        let windows = [("00:00", "11:59"), ("12:00", "23:59")];
        let mut departures = Vec::new();
        for (from, to) in windows {
            let path = format!(
                "/flights/airports/iata/{origin}/{date}T{from}/{date}T{to}"
            );
            let request = self.get(api_key, &path).query(&[
                ("direction", "Departure"),
                ("withCancelled", "false"),
                ("withCodeshared", "false"),
                ("withLeg", "true"),
            ]);
            if let Some(payload) = fetch_json(AERODATABOX_SOURCE, request).await? {
                departures.extend(items(&payload, &["departures"]).iter().cloned());
            }
        }
        Ok(departures)
    }
}

fn request_date(date: Option<&str>) -> Result<NaiveDate, SmartFillError> {
    match date {
        None => Ok(Utc::now().date_naive()),
        Some(raw) => parse_date(raw)
            .ok_or_else(|| SmartFillError::InvalidRequest(format!("unrecognised date {raw:?}"))),
    }
}

fn compact_code(code: &str) -> String {
    code.split_whitespace().collect::<String>().to_uppercase()
}

/// A flight designator goes into the request path, so only `[A-Z0-9]{2,8}`
/// is accepted.
fn flight_code(code: &str) -> Result<String, SmartFillError> {
    let compact = compact_code(code);
    if (2..=8).contains(&compact.len()) && compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(compact)
    } else {
        Err(SmartFillError::InvalidRequest(format!(
            "unrecognised flight number {code:?}"
        )))
    }
}

fn option_title(index: usize) -> String {
    if index == 0 {
        "Direct Flight".to_string()
    } else {
        format!("Option {}", index + 1)
    }
}

/// Airport boards describe the far end under `movement`; rebuild a
/// departure/arrival pair so one normalizer handles both shapes.
fn board_entry_to_flight(entry: &Value, origin: &str) -> Option<Value> {
    if pick(entry, ARRIVAL_KEYS).is_some() {
        return Some(entry.clone());
    }
    let movement = entry.get("movement")?;
    Some(json!({
        "number": entry.get("number"),
        "airline": entry.get("airline"),
        "status": entry.get("status"),
        "departure": {
            "airport": {"iata": origin},
            "scheduledTime": movement.get("scheduledTime"),
            "revisedTime": movement.get("revisedTime"),
            "terminal": movement.get("terminal"),
        },
        "arrival": {
            "airport": movement.get("airport"),
        },
    }))
}

fn lands_at(flight: &Value, destination: &str) -> bool {
    let Some(arrival) = pick(flight, ARRIVAL_KEYS) else {
        return false;
    };
    let airport = pick(arrival, AIRPORT_KEYS).unwrap_or(arrival);
    pick_str(airport, &["iata", "iataCode"]).is_some_and(|code| code.eq_ignore_ascii_case(destination))
        || pick_str(airport, &["icao"]).is_some_and(|code| code.eq_ignore_ascii_case(destination))
}

struct Endpoint {
    name: Option<String>,
    code: Option<String>,
    terminal: Option<String>,
    time: Option<String>,
    timezone: Option<String>,
    lat: Option<rust_decimal::Decimal>,
    lng: Option<rust_decimal::Decimal>,
}

impl Endpoint {
    fn read(flight: &Value, keys: &[&str]) -> Self {
        let Some(side) = pick(flight, keys) else {
            return Endpoint {
                name: None,
                code: None,
                terminal: None,
                time: None,
                timezone: None,
                lat: None,
                lng: None,
            };
        };
        let airport = pick(side, AIRPORT_KEYS).unwrap_or(side);
        Endpoint {
            name: pick_str(airport, &["name", "shortName", "municipalityName"]),
            code: pick_str(airport, &["iata", "iataCode", "icao"]),
            terminal: pick_str(side, &["terminal"]),
            time: pick_timestamp(side, TIME_KEYS),
            timezone: pick_str(airport, &["timeZone", "timezone"])
                .or_else(|| pick_str(side, &["timeZone", "timezone"])),
            lat: pick_decimal(airport, &["location.lat", "latitude"]),
            lng: pick_decimal(airport, &["location.lon", "location.lng", "longitude"]),
        }
    }

    fn display(&self) -> Option<String> {
        self.name.clone().or_else(|| self.code.clone())
    }

    fn label(&self) -> Option<String> {
        labelled_code(self.name.as_deref(), self.code.as_deref())
    }

    fn to_metadata(&self) -> Value {
        json!({
            "airport": self.name,
            "iata": self.code,
            "terminal": self.terminal,
            "time": self.time,
            "timezone": self.timezone,
        })
    }
}

/// Builds a `flight` suggestion from one provider flight record.
pub fn normalize_flight(flight: &Value, fallback_code: &str, source: &str) -> SegmentSuggestion {
    let departure = Endpoint::read(flight, DEPARTURE_KEYS);
    let arrival = Endpoint::read(flight, ARRIVAL_KEYS);
    let code = pick_str(flight, &["number", "flightNumber", "callSign"])
        .map(|number| compact_code(&number))
        .or_else(|| Some(compact_code(fallback_code)).filter(|code| !code.is_empty()));
    let airline = pick_str(flight, &["airline.name", "airlineName", "carrier.name"]);

    let mut segment = SegmentSuggestion::new(SegmentType::Flight, source);
    segment.title = match (&code, departure.display(), arrival.display()) {
        (Some(code), Some(from), Some(to)) => Some(format!("{code} · {from} → {to}")),
        (Some(code), _, _) => Some(code.clone()),
        (None, Some(from), Some(to)) => Some(format!("{from} → {to}")),
        _ => None,
    };
    segment.description = match (&airline, &code) {
        (Some(airline), Some(code)) => Some(format!("{airline} flight {code}")),
        _ => None,
    };
    segment.location_name = departure.display();
    segment.location_lat = departure.lat;
    segment.location_lng = departure.lng;
    segment.start_time = departure.time.clone();
    segment.end_time = arrival.time.clone();
    segment.provider_name = airline.clone();
    segment.transport_number = code;
    segment.timezone = departure.timezone.clone().or_else(|| arrival.timezone.clone());

    segment.insert_metadata("departure", departure.to_metadata());
    segment.insert_metadata("arrival", arrival.to_metadata());
    segment.insert_metadata(
        "airline",
        json!({
            "name": airline,
            "iata": pick_str(flight, &["airline.iata", "airline.iataCode"]),
        }),
    );
    if let Some(status) = pick_str(flight, &["status"]) {
        segment.insert_metadata("status", Value::String(status));
    }

    let mut highlights = Highlights::default();
    highlights
        .push("Departure", departure.label())
        .push("Arrival", arrival.label())
        .push("Airline", airline)
        .push("Departure terminal", departure.terminal.clone())
        .push("Arrival terminal", arrival.terminal.clone());
    segment.highlights = highlights.finish();
    segment
}

struct MockLeg {
    number: &'static str,
    from: String,
    to: String,
    depart_minutes: i64,
    duration_minutes: i64,
}

fn mock_leg(leg: &MockLeg, date: NaiveDate, origin: &str, destination: &str) -> SegmentSuggestion {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now);
    let start = midnight + Duration::minutes(leg.depart_minutes);
    let end = start + Duration::minutes(leg.duration_minutes);

    let mut segment = SegmentSuggestion::new(SegmentType::Flight, MOCK_SOURCE);
    segment.title = Some(format!("{} · {} → {}", leg.number, leg.from, leg.to));
    segment.description = Some("Sample schedule, no live flight data".to_string());
    segment.location_name = Some(leg.from.clone());
    segment.start_time = Some(format_utc(&start));
    segment.end_time = Some(format_utc(&end));
    segment.provider_name = Some("Sample Air".to_string());
    segment.transport_number = Some(leg.number.to_string());
    segment.insert_metadata("mock", Value::Bool(true));
    segment.insert_metadata(
        "route",
        json!({"origin": origin, "destination": destination}),
    );
    let mut highlights = Highlights::default();
    highlights
        .push("Departure", Some(leg.from.clone()))
        .push("Arrival", Some(leg.to.clone()))
        .push("Airline", Some("Sample Air"));
    segment.highlights = highlights.finish();
    segment
}

/// Illustrative plans shown when no live schedule is available.
pub fn mock_route_plans(
    origin: &str,
    destination: &str,
    date: NaiveDate,
) -> Vec<SegmentAutofillPlan> {
    let origin = if origin.is_empty() { "ORIGIN" } else { origin };
    let destination = if destination.is_empty() {
        "DESTINATION"
    } else {
        destination
    };
    let connection = "Connection";
    let direct = |number, depart_minutes| MockLeg {
        number,
        from: origin.to_string(),
        to: destination.to_string(),
        depart_minutes,
        duration_minutes: 11 * 60,
    };
    let plans = [
        ("Direct Flight", vec![direct("SA100", 8 * 60)]),
        (
            "Option 2",
            vec![
                MockLeg {
                    number: "SA210",
                    from: origin.to_string(),
                    to: connection.to_string(),
                    depart_minutes: 10 * 60,
                    duration_minutes: 3 * 60,
                },
                MockLeg {
                    number: "SA211",
                    from: connection.to_string(),
                    to: destination.to_string(),
                    depart_minutes: 14 * 60 + 30,
                    duration_minutes: 8 * 60,
                },
            ],
        ),
        ("Option 3", vec![direct("SA300", 19 * 60 + 45)]),
    ];

    plans
        .into_iter()
        .filter_map(|(title, legs)| {
            let stops = legs.len() - 1;
            let description = if stops == 0 {
                format!("{origin} → {destination} · Nonstop (sample)")
            } else {
                format!("{origin} → {destination} · {stops} stop (sample)")
            };
            let segments = legs
                .iter()
                .map(|leg| mock_leg(leg, date, origin, destination))
                .collect();
            SegmentAutofillPlan::journey(title, Some(description), segments)
        })
        .collect()
}

/// `ORIGIN/DEST` style airport pairs: both sides must be 3-letter codes.
pub fn parse_route(query: &str) -> Option<(String, String)> {
    let (origin, destination) = split_pair(query, &["/", " to ", "-", "→"])?;
    let is_code = |code: &str| code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic());
    if is_code(&origin) && is_code(&destination) {
        Some((origin.to_uppercase(), destination.to_uppercase()))
    } else {
        None
    }
}

/// Flight requests: a flight number is a point lookup, an airport pair is a
/// route search, and a pair with `metadata.search = "offers"` is an offer search.
pub struct FlightSearch {
    schedules: AeroDataBoxService,
    offers: FlightOffersService,
}

impl FlightSearch {
    pub fn new(schedules: AeroDataBoxService, offers: FlightOffersService) -> Self {
        FlightSearch { schedules, offers }
    }
}

#[async_trait]
impl AutofillProvider for FlightSearch {
    fn name(&self) -> &'static str {
        AERODATABOX_SOURCE
    }

    async fn autofill(
        &self,
        request: &AutofillRequest,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError> {
        let date = request.date.as_deref();
        match parse_route(&request.query) {
            Some((origin, destination)) if request.metadata_str("search") == Some("offers") => {
                self.offers.search_offers(&origin, &destination, date).await
            }
            Some((origin, destination)) => {
                Ok(self.schedules.search_route(&origin, &destination, date).await)
            }
            None => Ok(self
                .schedules
                .lookup_flight(&request.query, date)
                .await?
                .into_iter()
                .collect()),
        }
    }
}
