use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use thiserror::Error;

use crate::api::{ApiContext, AppointmentRecord, SEARCH_PATH, SearchPayload};
use crate::auth::AuthToken;
use crate::request::MonitorRequest;
use crate::slot::Slot;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success status or a body that is not a list of records.
    #[error("invalid search response: {0}")]
    Invalid(String),
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Retrieves candidate slots from the search endpoint.
#[derive(Clone, Debug)]
pub struct AppointmentFetcher {
    context: ApiContext,
}

impl AppointmentFetcher {
    pub fn new(context: ApiContext) -> Self {
        Self { context }
    }

    /// Search for slots using the request's location, exam type and filters.
    ///
    /// The provider may or may not have filtered server-side, so the result is
    /// raw and must still go through the slot filter.
    pub async fn fetch(
        &self,
        token: &AuthToken,
        request: &MonitorRequest,
    ) -> Result<Vec<Slot>, FetchError> {
        let url = self.context.url(SEARCH_PATH);
        tracing::debug!("Searching appointments at location {}", request.location_id);

        let response = self
            .context
            .client()
            .post(&url)
            .headers(self.context.headers())
            .header(AUTHORIZATION, token.as_str())
            .json(&SearchPayload::from_request(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Invalid(format!("status {status}")));
        }

        let body = response.text().await?;
        parse_slots(&body)
    }
}

/// Parse a search response body into slots.
///
/// The body must be a JSON array. Individual records that cannot be
/// understood are dropped with a warning rather than failing the whole list.
pub fn parse_slots(body: &str) -> Result<Vec<Slot>, FetchError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Invalid(format!("body is not JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(FetchError::Invalid("body is not a list".to_string()));
    };

    let mut slots = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<AppointmentRecord>(item) {
            Ok(record) => match record.to_slot() {
                Some(slot) => slots.push(slot),
                None => tracing::warn!(
                    "Dropping record with unparseable date/time: {} {}",
                    record.appointment_dt.date,
                    record.start_tm
                ),
            },
            Err(e) => tracing::warn!("Dropping malformed appointment record: {}", e),
        }
    }

    Ok(slots)
}
