use async_trait::async_trait;
use log::*;
use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::autofill::{AutofillRequest, SegmentAutofillPlan};
use crate::SmartFillError;

pub mod database;
pub mod flights;
pub mod geocoding;
pub mod offers;
pub mod places;
pub mod rides;
pub mod trains;

/// One external data source, answering autofill requests of one kind.
#[async_trait]
pub trait AutofillProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Plans in preference order. Empty when the provider found nothing.
    async fn autofill(
        &self,
        request: &AutofillRequest,
    ) -> Result<Vec<SegmentAutofillPlan>, SmartFillError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinates {
    #[serde(with = "rust_decimal::serde::float")]
    pub lat: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub lng: Decimal,
}

/// A resolved place, as returned by geocoding or place search.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub address: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub category: Option<String>,
    pub raw: Value,
}

/// Sends `request` and reads a JSON body.
///
/// `404` and `204` mean the provider has no record and yield `Ok(None)`; any
/// other non-success status, transport error, or unreadable body is a
/// `ProviderRequest` error.
pub(crate) async fn fetch_json(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<Option<Value>, SmartFillError> {
    let response = request
        .send()
        .await
        .map_err(|e| SmartFillError::request(provider, e))?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
        trace!("{provider} has no record ({status}).");
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SmartFillError::request(provider, format!("{status} - {body}")));
    }
    let body = response
        .text()
        .await
        .map_err(|e| SmartFillError::request(provider, e))?;
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&body)
        .map_err(|e| SmartFillError::request(provider, format!("unreadable response: {e}")))?;
    Ok(Some(value))
}

/// First element of a list payload, looking inside the usual envelope keys.
pub(crate) fn first_item<'a>(payload: &'a Value, envelope_keys: &[&str]) -> Option<&'a Value> {
    if let Some(items) = payload.as_array() {
        return items.first();
    }
    envelope_keys
        .iter()
        .find_map(|key| payload.get(key)?.as_array()?.first())
}

pub(crate) fn items<'a>(payload: &'a Value, envelope_keys: &[&str]) -> &'a [Value] {
    if let Some(items) = payload.as_array() {
        return items;
    }
    envelope_keys
        .iter()
        .find_map(|key| payload.get(key)?.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Splits `"A/B"` or `"A to B"` into two trimmed, non-empty parts.
/// Separators match ASCII case-insensitively.
pub fn split_pair(query: &str, separators: &[&str]) -> Option<(String, String)> {
    separators.iter().find_map(|separator| {
        let index = find_ignore_ascii_case(query, separator)?;
        let left = query[..index].trim();
        let right = query[index + separator.len()..].trim();
        if left.is_empty() || right.is_empty() {
            None
        } else {
            Some((left.to_string(), right.to_string()))
        }
    })
}

/// Byte index of `needle` in `haystack`, always on a char boundary.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.char_indices().map(|(index, _)| index).find(|&index| {
        haystack
            .get(index..index + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle))
    })
}
