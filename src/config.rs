use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::api::DEFAULT_BASE_URL;
use crate::locations;
use crate::monitor::DEFAULT_SUBJECT;
use crate::notify::DEFAULT_NTFY_SERVER;
use crate::request::{
    DayPart, Identity, MonitorRequest, ValidationError, parse_date, parse_interval, parse_time,
    parse_weekday,
};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub icbc: IcbcConfig,
    pub search: SearchConfig,
    pub schedule: ScheduleConfig,
    pub api: ApiConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationConfig,
}

/// Identity credentials for the provider login.
#[derive(Deserialize, Clone, Default)]
pub struct IcbcConfig {
    pub last_name: String,
    pub licence_number: String,
    pub keyword: String,
}

impl std::fmt::Debug for IcbcConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcbcConfig")
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

/// Search filters as written in the config file; parsed by `monitor_request`.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Numeric location id or a known centre name.
    pub location: String,
    pub exam_class: String,
    pub start_date: String,
    pub end_date: String,
    pub start_time: String,
    pub end_time: String,
    pub days: Vec<String>,
    pub parts_of_day: Vec<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// e.g. "0.5h", "1h", "30m"
    pub interval: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: "1h".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub snapshot_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("appointments.txt"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub subject: String,
    /// Show a desktop notification (needs the `desktop` feature).
    pub desktop: bool,
    /// Ntfy topic for phone notifications
    pub ntfy_topic: Option<String>,
    pub ntfy_server: String,
    pub email: Option<EmailConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            desktop: false,
            ntfy_topic: None,
            ntfy_server: DEFAULT_NTFY_SERVER.to_string(),
            email: None,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_address: String,
    pub sender_pass: String,
    pub receiver_addresses: Vec<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender_address", &self.sender_address)
            .field("receiver_addresses", &self.receiver_addresses)
            .finish_non_exhaustive()
    }
}

const ALL_DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl AppConfig {
    /// Load configuration, lowest priority first: defaults, `./config.toml`,
    /// the user config directory, `explicit` (required if given), then
    /// `ROADTEST__SECTION__KEY` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roadtest-monitor");

        let mut builder = Config::builder()
            // Identity
            .set_default("icbc.last_name", "")?
            .set_default("icbc.licence_number", "")?
            .set_default("icbc.keyword", "")?
            // Search
            .set_default("search.location", "")?
            .set_default("search.exam_class", "5")?
            .set_default("search.start_date", "")?
            .set_default("search.end_date", "")?
            .set_default("search.start_time", "00:00")?
            .set_default("search.end_time", "23:59")?
            .set_default("search.days", ALL_DAYS.to_vec())?
            .set_default("search.parts_of_day", vec!["Morning", "Afternoon"])?
            .set_default("search.max_results", 10)?
            // Schedule
            .set_default("schedule.interval", "1h")?
            // API
            .set_default("api.base_url", DEFAULT_BASE_URL)?
            // Network
            .set_default("network.request_timeout_secs", 30)?
            .set_default("network.connect_timeout_secs", 10)?
            // Storage
            .set_default("storage.snapshot_path", "appointments.txt")?
            // Notifications
            .set_default("notifications.subject", DEFAULT_SUBJECT)?
            .set_default("notifications.desktop", false)?
            .set_default("notifications.ntfy_topic", None::<String>)?
            .set_default("notifications.ntfy_server", DEFAULT_NTFY_SERVER)?
            // Local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))
            // User config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // Environment variables (ROADTEST__ICBC__KEYWORD=...)
        builder = builder.add_source(
            Environment::with_prefix("ROADTEST")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("search.days")
                .with_list_parse_key("search.parts_of_day")
                .with_list_parse_key("notifications.email.receiver_addresses"),
        );

        let s = builder.build().context("Failed to build configuration")?;
        s.try_deserialize().context("Failed to parse configuration")
    }

    /// Convert the raw search settings into a typed, validated request.
    pub fn monitor_request(&self) -> Result<MonitorRequest, ValidationError> {
        let search = &self.search;

        let weekdays = search
            .days
            .iter()
            .map(|day| parse_weekday(day))
            .collect::<Result<Vec<_>, _>>()?;
        let day_parts = search
            .parts_of_day
            .iter()
            .map(|part| part.parse::<DayPart>())
            .collect::<Result<Vec<_>, _>>()?;

        let request = MonitorRequest {
            identity: Identity {
                last_name: self.icbc.last_name.trim().to_string(),
                licence_number: self.icbc.licence_number.trim().to_string(),
                keyword: self.icbc.keyword.trim().to_string(),
            },
            location_id: locations::resolve(&search.location)?,
            exam_class: search.exam_class.trim().to_string(),
            start_date: parse_date("start_date", &search.start_date)?,
            end_date: parse_date("end_date", &search.end_date)?,
            start_time: parse_time("start_time", &search.start_time)?,
            end_time: parse_time("end_time", &search.end_time)?,
            weekdays,
            day_parts,
            interval: parse_interval(&self.schedule.interval)?,
            max_results: search.max_results,
        };

        request.validate()?;
        Ok(request)
    }
}
