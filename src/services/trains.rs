use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use log::*;
use serde_json::{json, Value};

use super::{fetch_json, first_item, AutofillProvider};
use crate::autofill::normalize::{
    format_utc, parse_date, parse_timestamp, pick_decimal, pick_str, Highlights,
};
use crate::autofill::{AutofillRequest, SegmentAutofillPlan, SegmentSuggestion, SegmentType};
use crate::config::TransitProviderConfig;
use crate::SmartFillError;

pub const NAVITIA_SOURCE: &str = "navitia";

#[derive(Debug, Clone, PartialEq)]
struct StopTime {
    name: Option<String>,
    lat: Option<rust_decimal::Decimal>,
    lng: Option<rust_decimal::Decimal>,
    arrival: Option<String>,
    departure: Option<String>,
}

/// Train and transit service lookups by code against a Navitia coverage region.
pub struct TransitService {
    client: reqwest::Client,
    config: TransitProviderConfig,
}

impl TransitService {
    pub fn new(client: reqwest::Client, config: TransitProviderConfig) -> Self {
        TransitService { client, config }
    }

    pub async fn lookup_service(
        &self,
        code: &str,
        date: Option<&str>,
    ) -> Result<Option<SegmentAutofillPlan>, SmartFillError> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or(SmartFillError::unavailable(NAVITIA_SOURCE))?;
        let date = match date {
            None => Utc::now().date_naive(),
            Some(raw) => parse_date(raw).ok_or_else(|| {
                SmartFillError::InvalidRequest(format!("unrecognised date {raw:?}"))
            })?,
        };
        let code = code.trim();
        let day = date.format("%Y%m%d").to_string();

        let request = self
            .client
            .get(format!(
                "{}/v1/coverage/{}/vehicle_journeys",
                self.config.base_url.trim_end_matches('/'),
                self.config.coverage
            ))
            .header(reqwest::header::AUTHORIZATION, token)
            .query(&[
                ("headsign", code.to_string()),
                ("since", format!("{day}T000000")),
                ("until", format!("{day}T235959")),
                ("depth", "2".to_string()),
            ]);
        let Some(payload) = fetch_json(NAVITIA_SOURCE, request).await? else {
            return Ok(None);
        };
        let Some(journey) = first_item(&payload, &["vehicle_journeys"]) else {
            trace!("Navitia has no journey for {code} on {date}.");
            return Ok(None);
        };

        let segment = normalize_journey(journey, code, date);
        let title = segment.title.clone().unwrap_or_else(|| code.to_string());
        Ok(Some(SegmentAutofillPlan::single(
            title,
            segment.description.clone(),
            segment,
        )))
    }
}

#[async_trait]
impl AutofillProvider for TransitService {
    fn name(&self) -> &'static str {
        NAVITIA_SOURCE
    }

    async fn autofill(
        &self,
        request: &AutofillRequest,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError> {
        Ok(self
            .lookup_service(&request.query, request.date.as_deref())
            .await?
            .into_iter()
            .collect())
    }
}

/// Walks a journey's stop times in order. A stop time is either a full
/// compact date-time or a bare `HHMMSS` on the current service day; the day
/// advances whenever a bare time runs backwards past midnight.
struct StopClock {
    day: NaiveDate,
    last: Option<DateTime<Utc>>,
}

impl StopClock {
    fn new(day: NaiveDate) -> Self {
        StopClock { day, last: None }
    }

    fn instant(&mut self, stop: &Value, full_keys: &[&str], time_keys: &[&str]) -> Option<String> {
        let instant = match pick_str(stop, full_keys).and_then(|raw| parse_timestamp(&raw)) {
            Some(instant) => instant,
            None => {
                let time = NaiveTime::parse_from_str(&pick_str(stop, time_keys)?, "%H%M%S").ok()?;
                let mut instant = self.day.and_time(time).and_utc();
                if self.last.is_some_and(|last| instant < last) {
                    instant += Duration::days(1);
                }
                instant
            }
        };
        self.day = instant.date_naive();
        self.last = Some(instant);
        Some(format_utc(&instant))
    }

    fn read(&mut self, stop: &Value) -> StopTime {
        StopTime {
            name: pick_str(stop, &["stop_point.name", "stop_point.label", "stop_area.name"]),
            lat: pick_decimal(stop, &["stop_point.coord.lat"]),
            lng: pick_decimal(stop, &["stop_point.coord.lon"]),
            arrival: self.instant(
                stop,
                &["arrival_date_time", "base_arrival_date_time"],
                &["arrival_time", "utc_arrival_time"],
            ),
            departure: self.instant(
                stop,
                &["departure_date_time", "base_departure_date_time"],
                &["departure_time", "utc_departure_time"],
            ),
        }
    }
}

fn normalize_journey(journey: &Value, code: &str, day: NaiveDate) -> SegmentSuggestion {
    let stops: Vec<StopTime> = journey
        .get("stop_times")
        .and_then(Value::as_array)
        .map(|stops| {
            let mut clock = StopClock::new(day);
            stops.iter().map(|stop| clock.read(stop)).collect()
        })
        .unwrap_or_default();
    let first = stops.first();
    let last = stops.last().filter(|_| stops.len() > 1);
    let line = pick_str(
        journey,
        &[
            "journey_pattern.route.line.name",
            "journey_pattern.route.line.code",
            "line.name",
        ],
    );
    let network = pick_str(
        journey,
        &["journey_pattern.route.line.network.name", "network.name"],
    );
    let number = pick_str(journey, &["headsign", "name"]).unwrap_or_else(|| code.to_string());
    let from = first.and_then(|stop| stop.name.clone());
    let to = last.and_then(|stop| stop.name.clone());

    let mut segment = SegmentSuggestion::new(SegmentType::Transport, NAVITIA_SOURCE);
    segment.title = Some(match (&from, &to) {
        (Some(from), Some(to)) => format!("{number} · {from} → {to}"),
        _ => number.clone(),
    });
    segment.description = line.as_ref().map(|line| match &network {
        Some(network) => format!("{network} {line}"),
        None => line.clone(),
    });
    segment.location_name = from.clone();
    segment.location_lat = first.and_then(|stop| stop.lat);
    segment.location_lng = first.and_then(|stop| stop.lng);
    segment.start_time = first.and_then(|stop| stop.departure.clone().or(stop.arrival.clone()));
    segment.end_time = last.and_then(|stop| stop.arrival.clone().or(stop.departure.clone()));
    segment.provider_name = network.clone();
    segment.transport_number = Some(number);

    segment.insert_metadata("journey_id", json!(pick_str(journey, &["id"])));
    segment.insert_metadata("line", json!(line));
    segment.insert_metadata(
        "stop_times",
        Value::Array(
            stops
                .iter()
                .map(|stop| {
                    json!({
                        "name": stop.name,
                        "lat": stop.lat.map(|d| d.to_string()),
                        "lng": stop.lng.map(|d| d.to_string()),
                        "arrival": stop.arrival,
                        "departure": stop.departure,
                    })
                })
                .collect(),
        ),
    );

    let mut highlights = Highlights::default();
    highlights
        .push("From", from)
        .push("To", to)
        .push("Line", line);
    segment.highlights = highlights.finish();
    segment
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn first_and_last_stops_bound_the_segment() {
        let journey = json!({
            "id": "vehicle_journey:SNCF:6611",
            "headsign": "6611",
            "journey_pattern": {"route": {"line": {"name": "Paris - Lyon", "network": {"name": "TGV INOUI"}}}},
            "stop_times": [
                {"stop_point": {"name": "Paris Gare de Lyon", "coord": {"lat": "48.844", "lon": "2.374"}}, "departure_date_time": "20240501T083000"},
                {"stop_point": {"name": "Le Creusot"}, "arrival_time": "095800", "departure_time": "100000"},
                {"stop_point": {"name": "Lyon Part-Dieu"}, "arrival_time": "105600"}
            ]
        });
        let segment = normalize_journey(&journey, "6611", day());

        assert_eq!(segment.segment_type, SegmentType::Transport);
        assert_eq!(
            segment.title.as_deref(),
            Some("6611 · Paris Gare de Lyon → Lyon Part-Dieu")
        );
        assert_eq!(segment.start_time.as_deref(), Some("2024-05-01T08:30:00Z"));
        assert_eq!(segment.end_time.as_deref(), Some("2024-05-01T10:56:00Z"));
        assert_eq!(segment.provider_name.as_deref(), Some("TGV INOUI"));
        assert_eq!(segment.transport_number.as_deref(), Some("6611"));
        assert!(segment.location_lat.is_some());
        assert_eq!(segment.metadata["stop_times"].as_array().unwrap().len(), 3);
        assert_eq!(segment.metadata["stop_times"][1]["departure"], "2024-05-01T10:00:00Z");

        let labels: Vec<String> = segment
            .highlights
            .unwrap()
            .into_iter()
            .map(|h| format!("{}={}", h.label, h.value))
            .collect();
        assert_eq!(
            labels,
            vec![
                "From=Paris Gare de Lyon",
                "To=Lyon Part-Dieu",
                "Line=Paris - Lyon"
            ]
        );
    }

    #[test]
    fn journey_without_stops_keeps_the_code() {
        let segment = normalize_journey(&json!({"stop_times": null}), "ICE 123", day());
        assert_eq!(segment.title.as_deref(), Some("ICE 123"));
        assert_eq!(segment.start_time, None);
        assert_eq!(segment.highlights, None);
        assert_eq!(segment.metadata["stop_times"], json!([]));
    }

    #[test]
    fn overnight_stops_roll_onto_the_next_day() {
        let journey = json!({
            "headsign": "5789",
            "stop_times": [
                {"stop_point": {"name": "Paris Austerlitz"}, "departure_time": "215000"},
                {"stop_point": {"name": "Toulouse"}, "arrival_time": "235500", "departure_time": "000500"},
                {"stop_point": {"name": "Latour-de-Carol"}, "arrival_time": "085000"}
            ]
        });
        let segment = normalize_journey(&journey, "5789", day());

        assert_eq!(segment.start_time.as_deref(), Some("2024-05-01T21:50:00Z"));
        assert_eq!(segment.end_time.as_deref(), Some("2024-05-02T08:50:00Z"));
        let toulouse = &segment.metadata["stop_times"][1];
        assert_eq!(toulouse["arrival"], "2024-05-01T23:55:00Z");
        assert_eq!(toulouse["departure"], "2024-05-02T00:05:00Z");
    }
}
