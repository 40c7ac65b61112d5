//! Roadtest Monitor Library
//!
//! Polls a road test booking service for open slots matching a date, time,
//! weekday and day-part window, keeps the last matching set on disk, and
//! notifies when a strictly earlier date becomes available.

pub mod api;
pub mod auth;
pub mod config;
pub mod detector;
pub mod fetcher;
pub mod filter;
pub mod headers;
pub mod locations;
pub mod monitor;
pub mod notify;
pub mod request;
pub mod slot;
pub mod snapshot;

// Re-export commonly used types
pub use api::ApiContext;
pub use auth::{AuthClient, AuthError, AuthToken};
pub use config::AppConfig;
pub use detector::{ChangeDetector, ChangeReason, Decision};
pub use fetcher::{AppointmentFetcher, FetchError};
pub use filter::SlotFilter;
pub use headers::{BrowserHeaders, FixedHeaders, HeaderProvider};
pub use monitor::{CycleError, CycleOutcome, MonitorError, MonitorLoop, NotifyStatus, PollCycle};
pub use notify::{CombinedNotifier, LogNotifier, MockNotifier, Notifier, NotifyError, NtfyNotifier};
#[cfg(feature = "desktop")]
pub use notify::DesktopNotifier;
#[cfg(feature = "email")]
pub use notify::EmailNotifier;
pub use request::{DayPart, Identity, MonitorRequest, ValidationError};
pub use slot::{Slot, Snapshot};
pub use snapshot::{SnapshotStore, StoreError};
