use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use roadtest_monitor::{
    AppointmentFetcher, AuthClient, BrowserHeaders, CombinedNotifier, LogNotifier, MonitorLoop,
    MonitorRequest, Notifier, NtfyNotifier, PollCycle, SnapshotStore, api::ApiContext,
    config::AppConfig, locations,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "roadtest-monitor")]
#[command(about = "Road test appointment monitor - notifies when an earlier slot opens up")]
struct Args {
    /// Path to a config file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,

    /// Print the known test centre names and ids, then exit
    #[arg(long)]
    list_locations: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("roadtest_monitor=debug");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if args.list_locations {
        for (name, id) in locations::KNOWN_LOCATIONS {
            println!("{id:>5}  {name}");
        }
        return Ok(());
    }

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let request = config
        .monitor_request()
        .context("Invalid monitoring settings")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    rt.block_on(run(config, request, args.once))
}

async fn run(config: AppConfig, request: MonitorRequest, once: bool) -> Result<()> {
    let monitor = build_monitor(&config)?;

    if once {
        tracing::info!("Running a single check");
        let outcome = monitor.cycle().run(&request).await;
        tracing::info!("Check finished: {:?}", outcome);
        return Ok(());
    }

    run_daemon(monitor, request).await
}

/// Run scheduled checks until Ctrl-C.
async fn run_daemon(mut monitor: MonitorLoop, request: MonitorRequest) -> Result<()> {
    tracing::info!("Starting Roadtest Monitor in daemon mode");
    monitor.start(request).context("Failed to start monitoring")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, waiting for the current check to finish");

    monitor.stop().await.context("Failed to stop monitoring")?;
    Ok(())
}

fn build_monitor(config: &AppConfig) -> Result<MonitorLoop> {
    let context = ApiContext::new(
        config.api.base_url.clone(),
        &config.network,
        Arc::new(BrowserHeaders),
    )?;
    tracing::info!("API client initialized for {}", context.base_url());

    let store = SnapshotStore::new(config.storage.snapshot_path.clone());
    let notifier = build_notifier(config)?;

    let cycle = PollCycle::new(
        AuthClient::new(context.clone()),
        AppointmentFetcher::new(context),
        store,
        notifier,
    )
    .with_subject(config.notifications.subject.clone());

    Ok(MonitorLoop::new(cycle))
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let settings = &config.notifications;
    let mut combined = CombinedNotifier::default();

    if let Some(topic) = &settings.ntfy_topic {
        let timeout = Duration::from_secs(config.network.request_timeout_secs);
        combined.push(Arc::new(NtfyNotifier::new(
            &settings.ntfy_server,
            topic,
            timeout,
        )?));
        tracing::info!("ntfy notifications enabled");
    }

    if settings.desktop {
        #[cfg(feature = "desktop")]
        {
            combined.push(Arc::new(roadtest_monitor::DesktopNotifier));
            tracing::info!("Desktop notifications enabled");
        }
        #[cfg(not(feature = "desktop"))]
        {
            tracing::warn!("Desktop notifications requested but the `desktop` feature is disabled");
        }
    }

    if let Some(email) = &settings.email {
        #[cfg(feature = "email")]
        {
            combined.push(Arc::new(roadtest_monitor::EmailNotifier::new(email)?));
            tracing::info!(
                "Email notifications enabled for {} recipient(s)",
                email.receiver_addresses.len()
            );
        }
        #[cfg(not(feature = "email"))]
        {
            let _ = email;
            tracing::warn!("Email notifications configured but the `email` feature is disabled");
        }
    }

    if combined.is_empty() {
        tracing::warn!("No notification channel configured, notifications go to the log");
        return Ok(Arc::new(LogNotifier));
    }
    Ok(Arc::new(combined))
}
