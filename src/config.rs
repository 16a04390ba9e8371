use std::time::Duration;

pub const DEFAULT_AERODATABOX_HOST: &str = "aerodatabox.p.rapidapi.com";
pub const DEFAULT_AERODATABOX_BASE_URL: &str = "https://aerodatabox.p.rapidapi.com";
pub const DEFAULT_AMADEUS_BASE_URL: &str = "https://test.api.amadeus.com";
pub const DEFAULT_NAVITIA_BASE_URL: &str = "https://api.navitia.io";
pub const DEFAULT_NAVITIA_COVERAGE: &str = "sncf";
pub const DEFAULT_FOURSQUARE_BASE_URL: &str = "https://api.foursquare.com";
pub const DEFAULT_NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = "smart-fill/0.1 (itinerary autofill)";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct FlightProviderConfig {
    pub api_key: Option<String>,
    pub api_host: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct OffersProviderConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct TransitProviderConfig {
    pub api_token: Option<String>,
    pub coverage: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PlacesProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub token: String,
}

/// Process configuration. Every provider is optional; each adapter decides on
/// its own what a missing credential means.
#[derive(Debug, Clone)]
pub struct Config {
    pub flights: FlightProviderConfig,
    pub offers: OffersProviderConfig,
    pub transit: TransitProviderConfig,
    pub places: PlacesProviderConfig,
    pub geocoder: GeocoderConfig,
    pub storage: Option<StorageConfig>,
    pub bind: String,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flights: FlightProviderConfig {
                api_key: None,
                api_host: DEFAULT_AERODATABOX_HOST.to_string(),
                base_url: DEFAULT_AERODATABOX_BASE_URL.to_string(),
            },
            offers: OffersProviderConfig {
                client_id: None,
                client_secret: None,
                base_url: DEFAULT_AMADEUS_BASE_URL.to_string(),
            },
            transit: TransitProviderConfig {
                api_token: None,
                coverage: DEFAULT_NAVITIA_COVERAGE.to_string(),
                base_url: DEFAULT_NAVITIA_BASE_URL.to_string(),
            },
            places: PlacesProviderConfig {
                api_key: None,
                base_url: DEFAULT_FOURSQUARE_BASE_URL.to_string(),
            },
            geocoder: GeocoderConfig {
                base_url: DEFAULT_NOMINATIM_BASE_URL.to_string(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            storage: None,
            bind: DEFAULT_BIND.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let storage = match (var("SUPABASE_ENDPOINT"), var("SUPABASE_TOKEN")) {
            (Some(endpoint), Some(token)) => Some(StorageConfig { endpoint, token }),
            _ => None,
        };

        let request_timeout = var("SMART_FILL_TIMEOUT_SECS")
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Config {
            flights: FlightProviderConfig {
                api_key: var("AERODATABOX_API_KEY"),
                api_host: var("AERODATABOX_API_HOST").unwrap_or(defaults.flights.api_host),
                base_url: var("AERODATABOX_BASE_URL").unwrap_or(defaults.flights.base_url),
            },
            offers: OffersProviderConfig {
                client_id: var("AMADEUS_CLIENT_ID"),
                client_secret: var("AMADEUS_CLIENT_SECRET"),
                base_url: var("AMADEUS_BASE_URL").unwrap_or(defaults.offers.base_url),
            },
            transit: TransitProviderConfig {
                api_token: var("NAVITIA_API_TOKEN"),
                coverage: var("NAVITIA_COVERAGE").unwrap_or(defaults.transit.coverage),
                base_url: var("NAVITIA_BASE_URL").unwrap_or(defaults.transit.base_url),
            },
            places: PlacesProviderConfig {
                api_key: var("FOURSQUARE_API_KEY"),
                base_url: var("FOURSQUARE_BASE_URL").unwrap_or(defaults.places.base_url),
            },
            geocoder: GeocoderConfig {
                base_url: var("NOMINATIM_BASE_URL").unwrap_or(defaults.geocoder.base_url),
                user_agent: var("NOMINATIM_USER_AGENT").unwrap_or(defaults.geocoder.user_agent),
            },
            storage,
            bind: var("SMART_FILL_BIND").unwrap_or(defaults.bind),
            request_timeout,
        }
    }
}
