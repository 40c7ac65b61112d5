use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::config::NetworkConfig;
use crate::headers::HeaderProvider;
use crate::request::{DATE_FORMAT, MonitorRequest, TIME_FORMAT};
use crate::slot::Slot;

pub const DEFAULT_BASE_URL: &str = "https://onlinebusiness.icbc.com/deas-api/v1";
pub const LOGIN_PATH: &str = "/webLogin/webLogin";
pub const SEARCH_PATH: &str = "/web/getAvailableAppointments";

/// Shared HTTP state for the login and search calls.
#[derive(Clone)]
pub struct ApiContext {
    client: reqwest::Client,
    base_url: String,
    headers: Arc<dyn HeaderProvider>,
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiContext {
    /// Create a new context with configurable timeouts.
    ///
    /// Every request carries the request timeout, so a hung call can delay
    /// the loop by at most one tick.
    pub fn new(
        base_url: impl Into<String>,
        network_config: &NetworkConfig,
        headers: Arc<dyn HeaderProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network_config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn headers(&self) -> HeaderMap {
        self.headers.headers()
    }
}

/// Body of the credential-exchange call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload<'a> {
    pub drvr_last_name: &'a str,
    pub licence_number: &'a str,
    pub keyword: &'a str,
}

impl<'a> LoginPayload<'a> {
    pub fn from_request(request: &'a MonitorRequest) -> Self {
        Self {
            drvr_last_name: &request.identity.last_name,
            licence_number: &request.identity.licence_number,
            keyword: &request.identity.keyword,
        }
    }
}

/// Body of the appointment search call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload<'a> {
    #[serde(rename = "aPosID")]
    pub a_pos_id: u32,
    pub exam_type: String,
    pub exam_date: String,
    pub ignore_reserve_time: &'static str,
    pub prf_days_of_week: String,
    pub prf_parts_of_day: String,
    pub last_name: &'a str,
    pub license_number: &'a str,
}

impl<'a> SearchPayload<'a> {
    pub fn from_request(request: &'a MonitorRequest) -> Self {
        Self {
            a_pos_id: request.location_id,
            exam_type: request.exam_type(),
            exam_date: request.start_date.format(DATE_FORMAT).to_string(),
            ignore_reserve_time: "false",
            prf_days_of_week: encode_codes(&request.weekday_codes()),
            prf_parts_of_day: encode_codes(&request.day_part_codes()),
            last_name: &request.identity.last_name,
            license_number: &request.identity.licence_number,
        }
    }
}

/// One slot record as returned by the search endpoint.
/// Only the fields the monitor relies on are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentRecord {
    #[serde(rename = "appointmentDt")]
    pub appointment_dt: AppointmentDate,
    #[serde(rename = "startTm")]
    pub start_tm: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentDate {
    pub date: String,
    /// Provider-supplied weekday; not trusted, the slot derives its own.
    #[serde(rename = "dayOfWeek", default)]
    pub day_of_week: Option<String>,
}

impl AppointmentRecord {
    /// Normalize into a `Slot`, or `None` if the date or time is unparseable.
    pub fn to_slot(&self) -> Option<Slot> {
        let date = NaiveDate::parse_from_str(self.appointment_dt.date.trim(), DATE_FORMAT).ok()?;
        let raw_time = self.start_tm.trim();
        let start_time = NaiveTime::parse_from_str(raw_time, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw_time, "%H:%M:%S"))
            .ok()?;
        Some(Slot::new(date, start_time))
    }
}

/// Encode codes as the bracketed list the endpoint expects, e.g. `[0,1,2]`.
pub fn encode_codes(codes: &[u8]) -> String {
    let joined = codes
        .iter()
        .map(|code| code.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{joined}]")
}
