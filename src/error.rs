use thiserror::Error;

use crate::services::database::AppliedPlan;

pub type GenericError = Box<dyn std::error::Error + Send + Sync>;

/// Failures an autofill provider can surface to its caller.
///
/// "Nothing found" is never an error: adapters return `Ok(None)` (or no
/// plans) for that case.
#[derive(Debug, Error)]
pub enum SmartFillError {
    /// A required credential is not configured. Raised before any network call.
    #[error("{provider} is not configured")]
    ProviderUnavailable { provider: &'static str },
    /// The provider answered with a non-success status or an unreadable body,
    /// or could not be reached at all.
    #[error("{provider} request failed: {message}")]
    ProviderRequest {
        provider: &'static str,
        message: String,
    },
    #[error("invalid autofill request: {0}")]
    InvalidRequest(String),
}

impl SmartFillError {
    pub fn unavailable(provider: &'static str) -> Self {
        SmartFillError::ProviderUnavailable { provider }
    }

    pub fn request(provider: &'static str, message: impl ToString) -> Self {
        SmartFillError::ProviderRequest {
            provider,
            message: message.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, SmartFillError::ProviderUnavailable { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("segment row was not returned by the database")]
    MissingRow(),
    #[error("database rejected the request: {status} - {body}")]
    Rejected { status: u16, body: String },
    #[error("plan has no actions")]
    EmptyPlan(),
    /// An action failed part way through a plan. `applied` is what is still
    /// committed after rolling back the rows the plan created.
    #[error("plan aborted: {message}")]
    Aborted {
        applied: AppliedPlan,
        message: String,
    },
}
