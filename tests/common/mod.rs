#![allow(dead_code)]

use serde_json::{json, Value};
use smart_fill::config::Config;

pub const FLIGHT_KEY: &str = "test-rapidapi-key";

/// Every provider pointed at one mock server, all credentials unset.
pub fn config_for(base_url: &str) -> Config {
    let mut config = Config::default();
    config.flights.base_url = base_url.to_string();
    config.offers.base_url = base_url.to_string();
    config.transit.base_url = base_url.to_string();
    config.transit.coverage = "sncf".to_string();
    config.places.base_url = base_url.to_string();
    config.geocoder.base_url = base_url.to_string();
    config
}

pub fn ua120_payload() -> Value {
    json!([{
        "number": "UA 120",
        "status": "Expected",
        "airline": {"name": "United Airlines", "iata": "UA"},
        "departure": {
            "airport": {"iata": "SFO", "name": "San Francisco Intl", "timeZone": "America/Los_Angeles"},
            "scheduledTimeLocal": "2024-05-01 11:25-07:00",
            "terminal": "I"
        },
        "arrival": {
            "airport": {"iata": "NRT", "name": "Narita Intl", "timeZone": "Asia/Tokyo"},
            "scheduledTimeUtc": "2024-05-02 05:40Z",
            "terminal": "1"
        }
    }])
}

pub fn park_hyatt_nominatim() -> Value {
    json!([{
        "place_id": 298436,
        "osm_type": "node",
        "lat": "35.6856",
        "lon": "139.6907",
        "name": "Park Hyatt Tokyo",
        "display_name": "Park Hyatt Tokyo, 3-7-1-2, Nishi-Shinjuku, Shinjuku, Tokyo, 163-1055, Japan",
        "category": "tourism",
        "type": "hotel"
    }])
}
