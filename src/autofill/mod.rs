//! Canonical autofill values shared by every provider adapter.
//!
//! Adapters never hand provider payloads to callers directly: everything is
//! converged on [`SegmentSuggestion`] and wrapped in [`SegmentAutofillPlan`]s.

use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod normalize;
pub mod registry;

/// Which segment form a suggestion targets.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    #[display(fmt = "flight")]
    Flight,
    #[display(fmt = "train")]
    Train,
    #[display(fmt = "hotel")]
    Hotel,
    #[display(fmt = "meal")]
    Meal,
    #[display(fmt = "activity")]
    Activity,
    #[display(fmt = "transport")]
    Transport,
    #[display(fmt = "custom")]
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSuggestion {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_address: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub location_lat: Option<Decimal>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub location_lng: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_all_day: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlights: Option<Vec<Highlight>>,
    pub source: String,
}

impl SegmentSuggestion {
    /// An empty suggestion whose metadata already carries the `source` tag.
    pub fn new(segment_type: SegmentType, source: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), Value::String(source.to_string()));
        SegmentSuggestion {
            segment_type,
            title: None,
            description: None,
            location_name: None,
            location_address: None,
            location_lat: None,
            location_lng: None,
            start_time: None,
            end_time: None,
            is_all_day: None,
            provider_name: None,
            confirmation_code: None,
            transport_number: None,
            timezone: None,
            metadata: Value::Object(metadata),
            highlights: None,
            source: source.to_string(),
        }
    }

    /// Adds a provider sub-object to the metadata bag. `Null` values are skipped.
    pub fn insert_metadata(&mut self, key: &str, value: Value) {
        if value.is_null() {
            return;
        }
        if let Value::Object(map) = &mut self.metadata {
            map.insert(key.to_string(), value);
        }
    }

    pub fn metadata_source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlanAction {
    Create {
        segment: SegmentSuggestion,
    },
    Delete {
        #[serde(rename = "segmentId")]
        segment_id: String,
    },
}

impl PlanAction {
    pub fn segment(&self) -> Option<&SegmentSuggestion> {
        match self {
            PlanAction::Create { segment } => Some(segment),
            PlanAction::Delete { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentAutofillPlan {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actions: Vec<PlanAction>,
}

impl SegmentAutofillPlan {
    /// Returns `None` when there is nothing to do: a plan always has actions.
    pub fn new(
        title: impl Into<String>,
        description: Option<String>,
        actions: Vec<PlanAction>,
    ) -> Option<Self> {
        if actions.is_empty() {
            return None;
        }
        Some(SegmentAutofillPlan {
            title: title.into(),
            description,
            actions,
        })
    }

    pub fn single(
        title: impl Into<String>,
        description: Option<String>,
        segment: SegmentSuggestion,
    ) -> Self {
        SegmentAutofillPlan {
            title: title.into(),
            description,
            actions: vec![PlanAction::Create { segment }],
        }
    }

    /// Legs in travel order.
    pub fn journey(
        title: impl Into<String>,
        description: Option<String>,
        legs: Vec<SegmentSuggestion>,
    ) -> Option<Self> {
        let actions = legs
            .into_iter()
            .map(|segment| PlanAction::Create { segment })
            .collect();
        Self::new(title, description, actions)
    }

    pub fn segments(&self) -> impl Iterator<Item = &SegmentSuggestion> {
        self.actions.iter().filter_map(PlanAction::segment)
    }
}

/// The kind of lookup a caller asks for. Each kind maps to one provider.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutofillKind {
    #[display(fmt = "flight")]
    Flight,
    #[display(fmt = "train")]
    Train,
    #[display(fmt = "hotel")]
    Hotel,
    #[display(fmt = "meal")]
    Meal,
    #[display(fmt = "activity")]
    Activity,
    #[display(fmt = "transport")]
    Transport,
}

impl AutofillKind {
    /// Whether a provider answering this kind may create a segment of `segment_type`.
    pub fn accepts(&self, segment_type: SegmentType) -> bool {
        match self {
            AutofillKind::Flight => segment_type == SegmentType::Flight,
            AutofillKind::Train => {
                matches!(segment_type, SegmentType::Train | SegmentType::Transport)
            }
            AutofillKind::Hotel => segment_type == SegmentType::Hotel,
            AutofillKind::Meal => segment_type == SegmentType::Meal,
            AutofillKind::Activity => segment_type == SegmentType::Activity,
            AutofillKind::Transport => segment_type == SegmentType::Transport,
        }
    }

    pub fn place_category(&self) -> Option<SegmentType> {
        match self {
            AutofillKind::Hotel => Some(SegmentType::Hotel),
            AutofillKind::Meal => Some(SegmentType::Meal),
            AutofillKind::Activity => Some(SegmentType::Activity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoContext {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, rename = "radiusMeters")]
    pub radius_meters: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutofillRequest {
    #[serde(rename = "type")]
    pub kind: AutofillKind,
    pub query: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub context: Option<GeoContext>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl AutofillRequest {
    pub fn new(kind: AutofillKind, query: impl Into<String>) -> Self {
        AutofillRequest {
            kind,
            query: query.into(),
            date: None,
            context: None,
            metadata: None,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_context(mut self, context: GeoContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

/// What the HTTP layer hands back: the top plan's first segment plus every plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentAutofillSuggestion {
    pub segment: SegmentSuggestion,
    pub plans: Vec<SegmentAutofillPlan>,
}

impl SegmentAutofillSuggestion {
    pub fn from_plans(plans: Vec<SegmentAutofillPlan>) -> Option<Self> {
        let segment = plans.first()?.segments().next()?.clone();
        Some(SegmentAutofillSuggestion { segment, plans })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn plan_without_actions_is_not_a_plan() {
        assert!(SegmentAutofillPlan::new("Nothing", None, vec![]).is_none());
        assert!(SegmentAutofillPlan::journey("Nothing", None, vec![]).is_none());
    }

    #[test]
    fn actions_serialize_as_tagged_variants() {
        let mut segment = SegmentSuggestion::new(SegmentType::Hotel, "nominatim");
        segment.title = Some("Park Hyatt Tokyo".to_string());
        segment.location_lat = Some(Decimal::new(356856, 4));
        let plan = SegmentAutofillPlan {
            title: "Replace stay".to_string(),
            description: None,
            actions: vec![
                PlanAction::Delete {
                    segment_id: "seg-1".to_string(),
                },
                PlanAction::Create { segment },
            ],
        };

        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(
            value,
            json!({
                "title": "Replace stay",
                "actions": [
                    {"type": "delete", "segmentId": "seg-1"},
                    {
                        "type": "create",
                        "segment": {
                            "type": "hotel",
                            "title": "Park Hyatt Tokyo",
                            "location_lat": 35.6856,
                            "metadata": {"source": "nominatim"},
                            "source": "nominatim"
                        }
                    }
                ]
            })
        );

        let back: SegmentAutofillPlan = serde_json::from_value(value).unwrap();
        assert_eq!(back.actions.len(), 2);
        assert_eq!(back.actions[0], plan.actions[0]);
    }

    #[test]
    fn request_accepts_camel_case_radius() {
        let request: AutofillRequest = serde_json::from_value(json!({
            "type": "meal",
            "query": "Sukiyabashi Jiro",
            "context": {"lat": 35.67, "lng": 139.76, "radiusMeters": 800}
        }))
        .unwrap();
        assert_eq!(request.kind, AutofillKind::Meal);
        assert_eq!(request.context.unwrap().radius_meters, Some(800.0));
    }

    #[test]
    fn train_kind_accepts_transport_segments() {
        assert!(AutofillKind::Train.accepts(SegmentType::Transport));
        assert!(!AutofillKind::Flight.accepts(SegmentType::Hotel));
        assert_eq!(AutofillKind::Activity.to_string(), "activity");
    }

    #[test]
    fn null_metadata_is_not_stored() {
        let mut segment = SegmentSuggestion::new(SegmentType::Flight, "aerodatabox");
        segment.insert_metadata("status", Value::Null);
        segment.insert_metadata("departure", json!({"iata": "SFO"}));
        assert_eq!(
            segment.metadata,
            json!({"source": "aerodatabox", "departure": {"iata": "SFO"}})
        );
        assert_eq!(segment.metadata_source(), Some("aerodatabox"));
    }
}
