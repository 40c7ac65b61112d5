//! Poll cycle and the scheduling state machine.
//!
//! One poll cycle: login, search, filter, compare against the stored
//! snapshot, persist on change, notify if an earlier date showed up. The
//! `MonitorLoop` runs cycles on a fixed interval from a single scheduler task,
//! so two cycles never overlap and the snapshot has a single writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::{AuthClient, AuthError};
use crate::detector::{ChangeDetector, ChangeReason, Decision};
use crate::fetcher::{AppointmentFetcher, FetchError};
use crate::filter::SlotFilter;
use crate::notify::Notifier;
use crate::request::{MonitorRequest, ValidationError};
use crate::slot::Snapshot;
use crate::snapshot::{SnapshotStore, StoreError};

pub const DEFAULT_SUBJECT: &str = "ICBC Appointment Changes";

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid monitor request: {0}")]
    Validation(#[from] ValidationError),
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("monitor is not running")]
    NotRunning,
    #[error("monitor must be started from within a tokio runtime")]
    NoRuntime,
}

/// Failures that abandon a single cycle. They never stop the schedule.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to load snapshot: {0}")]
    Load(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyStatus {
    NotRequired,
    Sent,
    Failed,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// The cycle was abandoned before comparing snapshots.
    Skipped(CycleError),
    Unchanged {
        matching: usize,
    },
    Changed {
        matching: usize,
        reason: ChangeReason,
        saved: bool,
        notification: NotifyStatus,
    },
}

/// Everything one poll cycle needs.
pub struct PollCycle {
    auth: AuthClient,
    fetcher: AppointmentFetcher,
    filter: SlotFilter,
    detector: ChangeDetector,
    store: SnapshotStore,
    notifier: Arc<dyn Notifier>,
    subject: String,
}

impl PollCycle {
    pub fn new(
        auth: AuthClient,
        fetcher: AppointmentFetcher,
        store: SnapshotStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            auth,
            fetcher,
            filter: SlotFilter,
            detector: ChangeDetector,
            store,
            notifier,
            subject: DEFAULT_SUBJECT.to_string(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run one cycle. Errors are logged and reported in the outcome, never
    /// propagated.
    pub async fn run(&self, request: &MonitorRequest) -> CycleOutcome {
        tracing::info!(
            "Checking available appointments at location {}",
            request.location_id
        );

        match self.try_run(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Cycle skipped: {}", e);
                CycleOutcome::Skipped(e)
            }
        }
    }

    async fn try_run(&self, request: &MonitorRequest) -> Result<CycleOutcome, CycleError> {
        // A token is never reused across cycles: its lifetime is unknown.
        let token = self.auth.get_token(request).await?;
        let raw = self.fetcher.fetch(&token, request).await?;

        let mut current = Snapshot::new(self.filter.apply(&raw, request));
        if let Some(limit) = request.max_results {
            current.keep_earliest(limit);
        }
        tracing::debug!("{} raw slots, {} matching", raw.len(), current.len());

        let previous = self.store.load()?;
        let decision = self.detector.decide(&previous, &current);

        let Decision::Changed { reason } = decision else {
            tracing::info!("No changes detected ({} matching slots)", current.len());
            return Ok(CycleOutcome::Unchanged {
                matching: current.len(),
            });
        };
        tracing::info!("Matching slots changed: {:?}", reason);

        let saved = match self.store.save(&current) {
            Ok(()) => {
                tracing::debug!("Snapshot saved to {}", self.store.path().display());
                true
            }
            Err(e) => {
                tracing::error!("Snapshot NOT saved, next cycle may repeat this change: {}", e);
                false
            }
        };

        // Independent of the save: a failed notification keeps the new snapshot.
        let notification = if decision.notify_worthy() {
            match self.notifier.send(&self.subject, &current.render()).await {
                Ok(()) => {
                    tracing::info!("Notification sent: {}", self.subject);
                    NotifyStatus::Sent
                }
                Err(e) => {
                    tracing::error!("Failed to send notification: {}", e);
                    NotifyStatus::Failed
                }
            }
        } else {
            NotifyStatus::NotRequired
        };

        Ok(CycleOutcome::Changed {
            matching: current.len(),
            reason,
            saved,
            notification,
        })
    }
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

enum LoopState {
    Idle,
    Running(RunningLoop),
}

/// Start/stop lifecycle around recurring poll cycles.
pub struct MonitorLoop {
    cycle: Arc<PollCycle>,
    state: LoopState,
    in_flight: Arc<AtomicBool>,
    completed: Arc<watch::Sender<u64>>,
}

impl MonitorLoop {
    pub fn new(cycle: PollCycle) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            cycle: Arc::new(cycle),
            state: LoopState::Idle,
            in_flight: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(completed),
        }
    }

    pub fn cycle(&self) -> &PollCycle {
        &self.cycle
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, LoopState::Running(_))
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Receiver of the number of cycles completed since construction.
    pub fn completed_cycles(&self) -> watch::Receiver<u64> {
        self.completed.subscribe()
    }

    /// Validate `request` and begin polling on the current tokio runtime.
    ///
    /// The first cycle runs immediately, later ones every `request.interval`.
    pub fn start(&mut self, request: MonitorRequest) -> Result<(), MonitorError> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        request.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        tracing::info!(
            "Starting monitor: location {}, {} to {}, {} to {}, every {:?}",
            request.location_id,
            request.start_date,
            request.end_date,
            request.start_time.format("%H:%M"),
            request.end_time.format("%H:%M"),
            request.interval
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run_schedule(
            Arc::clone(&self.cycle),
            request,
            shutdown_rx,
            Arc::clone(&self.in_flight),
            Arc::clone(&self.completed),
        ));

        self.state = LoopState::Running(RunningLoop { shutdown, handle });
        Ok(())
    }

    /// Stop scheduling. A cycle already in progress is allowed to finish
    /// before this returns; no new cycle starts afterwards.
    pub async fn stop(&mut self) -> Result<(), MonitorError> {
        let LoopState::Running(running) = std::mem::replace(&mut self.state, LoopState::Idle) else {
            return Err(MonitorError::NotRunning);
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!("Scheduler task ended abnormally: {}", e);
        }

        tracing::info!("Monitoring stopped");
        Ok(())
    }
}

async fn run_schedule(
    cycle: Arc<PollCycle>,
    request: MonitorRequest,
    mut shutdown: watch::Receiver<bool>,
    in_flight: Arc<AtomicBool>,
    completed: Arc<watch::Sender<u64>>,
) {
    let mut interval = tokio::time::interval(request.interval);
    // Ticks that pass while a cycle runs are dropped, not queued.
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if *shutdown.borrow() {
                    break;
                }

                in_flight.store(true, Ordering::SeqCst);
                let outcome = cycle.run(&request).await;
                in_flight.store(false, Ordering::SeqCst);

                tracing::debug!("Cycle finished: {:?}", outcome);
                completed.send_modify(|count| *count += 1);
            }
        }
    }
}
