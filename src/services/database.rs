use async_trait::async_trait;
use log::*;
use postgrest::Postgrest;
use serde::Serialize;
use serde_json::{json, Value};

use crate::autofill::normalize::pick_str;
use crate::autofill::{PlanAction, SegmentAutofillPlan, SegmentSuggestion};
use crate::config::StorageConfig;
use crate::{GenericError, StoreError};

const SEGMENTS_TABLE: &str = "segments";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppliedPlan {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Applies `plan` to an itinerary in action order, as the caller whose
    /// session token is `access_token`.
    ///
    /// A failing action aborts the plan with [`StoreError::Aborted`]: rows
    /// created so far are deleted again and whatever could not be undone is
    /// reported.
    async fn apply_plan(
        &self,
        itinerary_id: &str,
        plan: &SegmentAutofillPlan,
        access_token: &str,
    ) -> Result<AppliedPlan, GenericError>;
}

/// Segment storage over Supabase's PostgREST API. The configured key only
/// identifies the project (`apikey`); row access is always the caller's.
pub struct SupabaseService {
    client: Postgrest,
}

impl SupabaseService {
    pub fn new(config: &StorageConfig) -> Self {
        let client = Postgrest::new(&config.endpoint)
            .insert_header("apikey", config.token.clone());
        SupabaseService { client }
    }

    /// Deletes the rows this plan created. Rows that cannot be removed stay in
    /// `applied.created`.
    async fn roll_back(&self, itinerary_id: &str, applied: &mut AppliedPlan, token: &str) {
        let mut kept = Vec::new();
        for id in applied.created.drain(..) {
            match self.delete_segment(itinerary_id, &id, token).await {
                Ok(()) => trace!("Rolled back segment {id}."),
                Err(e) => {
                    error!("Could not roll back segment {id} on itinerary {itinerary_id}: {e}");
                    kept.push(id);
                }
            }
        }
        applied.created = kept;
    }

    async fn create_segment(
        &self,
        itinerary_id: &str,
        segment: &SegmentSuggestion,
        token: &str,
    ) -> Result<String, GenericError> {
        let row = segment_row(itinerary_id, segment);
        let response = self
            .client
            .from(SEGMENTS_TABLE)
            .auth(token)
            .insert(row.to_string())
            .execute()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let inserted: Value = serde_json::from_str(&body)?;
        let id = inserted
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| pick_str(row, &["id"]))
            .ok_or(StoreError::MissingRow())?;
        Ok(id)
    }

    async fn delete_segment(
        &self,
        itinerary_id: &str,
        segment_id: &str,
        token: &str,
    ) -> Result<(), GenericError> {
        let response = self
            .client
            .from(SEGMENTS_TABLE)
            .auth(token)
            .eq("id", segment_id)
            .eq("itinerary_id", itinerary_id)
            .delete()
            .execute()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for SupabaseService {
    async fn apply_plan(
        &self,
        itinerary_id: &str,
        plan: &SegmentAutofillPlan,
        access_token: &str,
    ) -> Result<AppliedPlan, GenericError> {
        if plan.actions.is_empty() {
            return Err(StoreError::EmptyPlan().into());
        }
        let mut applied = AppliedPlan::default();
        for action in &plan.actions {
            let outcome = match action {
                PlanAction::Create { segment } => self
                    .create_segment(itinerary_id, segment, access_token)
                    .await
                    .map(|id| {
                        trace!("Created segment {id} from {}.", segment.source);
                        applied.created.push(id);
                    }),
                PlanAction::Delete { segment_id } => self
                    .delete_segment(itinerary_id, segment_id, access_token)
                    .await
                    .map(|()| {
                        trace!("Deleted segment {segment_id}.");
                        applied.deleted.push(segment_id.clone());
                    }),
            };
            if let Err(e) = outcome {
                warn!("Plan {:?} failed on itinerary {itinerary_id}: {e}", plan.title);
                self.roll_back(itinerary_id, &mut applied, access_token).await;
                return Err(StoreError::Aborted {
                    applied,
                    message: e.to_string(),
                }
                .into());
            }
        }
        debug!(
            "Applied plan {:?} to itinerary {itinerary_id}: {} created, {} deleted.",
            plan.title,
            applied.created.len(),
            applied.deleted.len()
        );
        Ok(applied)
    }
}

/// The row written for a created segment. Highlights have no column of their
/// own and are kept in the metadata bag.
pub fn segment_row(itinerary_id: &str, segment: &SegmentSuggestion) -> Value {
    let mut metadata = segment.metadata.clone();
    if let (Value::Object(map), Some(highlights)) = (&mut metadata, &segment.highlights) {
        map.insert("highlights".to_string(), json!(highlights));
    }
    let mut row = json!({
        "itinerary_id": itinerary_id,
        "type": segment.segment_type,
        "title": segment.title,
        "description": segment.description,
        "location_name": segment.location_name,
        "location_address": segment.location_address,
        "start_time": segment.start_time,
        "end_time": segment.end_time,
        "is_all_day": segment.is_all_day.unwrap_or(false),
        "provider_name": segment.provider_name,
        "confirmation_code": segment.confirmation_code,
        "transport_number": segment.transport_number,
        "timezone": segment.timezone,
        "metadata": metadata,
        "source": segment.source,
    });
    // Coordinates go through the suggestion's own float encoding.
    if let (Value::Object(row), Ok(Value::Object(encoded))) =
        (&mut row, serde_json::to_value(segment))
    {
        for key in ["location_lat", "location_lng"] {
            row.insert(
                key.to_string(),
                encoded.get(key).cloned().unwrap_or(Value::Null),
            );
        }
    }
    row
}
