use std::sync::Arc;

use log::{info, trace, warn};

use smart_fill::api::{self, AppState};
use smart_fill::autofill::registry::AutofillService;
use smart_fill::config::Config;
use smart_fill::services::database::{SegmentStore, SupabaseService};
use smart_fill::GenericError;

#[tokio::main]
async fn main() -> Result<(), GenericError> {
    env_logger::builder()
        .filter_module("smart_fill", log::LevelFilter::Trace)
        .parse_default_env()
        .init();
    trace!("Logger init with level TRACE.");

    let config = Config::from_env();
    if config.flights.api_key.is_none() {
        warn!("AERODATABOX_API_KEY not set, flight lookups will fail and route search serves mock data.");
    }
    if config.places.api_key.is_none() {
        info!("FOURSQUARE_API_KEY not set, place search uses Nominatim only.");
    }

    let store: Option<Arc<dyn SegmentStore>> = match &config.storage {
        Some(storage) => Some(Arc::new(SupabaseService::new(storage))),
        None => {
            warn!("SUPABASE_ENDPOINT/SUPABASE_TOKEN not set, plan apply is disabled.");
            None
        }
    };

    let state = AppState {
        autofill: Arc::new(AutofillService::from_config(&config)?),
        store,
        timeout: config.request_timeout,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Smart fill listening on {}.", listener.local_addr()?);
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}
