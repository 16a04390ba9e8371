use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::*;

use super::{AutofillKind, AutofillRequest, PlanAction, SegmentAutofillPlan};
use crate::config::Config;
use crate::services::flights::{AeroDataBoxService, FlightSearch};
use crate::services::geocoding::{GeocodingService, NominatimService};
use crate::services::offers::FlightOffersService;
use crate::services::places::{PlaceSearchService, PLACE_KINDS};
use crate::services::rides::RideService;
use crate::services::trains::TransitService;
use crate::services::AutofillProvider;
use crate::SmartFillError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dispatch table from autofill kind to provider.
#[derive(Clone, Default)]
pub struct AutofillService {
    providers: HashMap<AutofillKind, Arc<dyn AutofillProvider>>,
}

impl AutofillService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires every provider from `config`, sharing one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, SmartFillError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| SmartFillError::request("http-client", e))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &Config, client: reqwest::Client) -> Self {
        let geocoder: Arc<dyn GeocodingService> =
            Arc::new(NominatimService::new(client.clone(), &config.geocoder));
        let flights = FlightSearch::new(
            AeroDataBoxService::new(client.clone(), config.flights.clone()),
            FlightOffersService::new(client.clone(), config.offers.clone()),
        );
        let places: Arc<dyn AutofillProvider> = Arc::new(PlaceSearchService::new(
            client.clone(),
            config.places.clone(),
            geocoder.clone(),
        ));

        let mut service = AutofillService::new()
            .with_provider(AutofillKind::Flight, Arc::new(flights))
            .with_provider(
                AutofillKind::Train,
                Arc::new(TransitService::new(client, config.transit.clone())),
            )
            .with_provider(AutofillKind::Transport, Arc::new(RideService::new(geocoder)));
        for kind in PLACE_KINDS {
            service = service.with_provider(kind, places.clone());
        }
        service
    }

    pub fn with_provider(mut self, kind: AutofillKind, provider: Arc<dyn AutofillProvider>) -> Self {
        self.providers.insert(kind, provider);
        self
    }

    /// Plans for `request`, best first. Empty means no match.
    pub async fn suggest(
        &self,
        request: &AutofillRequest,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError> {
        if request.query.trim().is_empty() {
            return Err(SmartFillError::InvalidRequest("query is empty".to_string()));
        }
        let provider = self.providers.get(&request.kind).ok_or_else(|| {
            SmartFillError::InvalidRequest(format!("no provider handles {}", request.kind))
        })?;

        trace!("Dispatching {} autofill to {}.", request.kind, provider.name());
        let plans = provider.autofill(request).await?;
        let plans = enforce_family(request.kind, plans);
        debug!(
            "{} returned {} plan(s) for {} query {:?}.",
            provider.name(),
            plans.len(),
            request.kind,
            request.query
        );
        Ok(plans)
    }
}

/// Drops created segments outside the kind's family, and plans left empty.
fn enforce_family(kind: AutofillKind, plans: Vec<SegmentAutofillPlan>) -> Vec<SegmentAutofillPlan> {
    plans
        .into_iter()
        .filter_map(|plan| {
            let SegmentAutofillPlan {
                title,
                description,
                actions,
            } = plan;
            let actions: Vec<PlanAction> = actions
                .into_iter()
                .filter(|action| match action {
                    PlanAction::Create { segment } if !kind.accepts(segment.segment_type) => {
                        warn!(
                            "Dropping {} segment from a {kind} plan.",
                            segment.segment_type
                        );
                        false
                    }
                    _ => true,
                })
                .collect();
            SegmentAutofillPlan::new(title, description, actions)
        })
        .collect()
}
