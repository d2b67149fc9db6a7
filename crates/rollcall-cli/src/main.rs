use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rollcall::{
    CaptureController, ChartRefresher, Config, TrainingMonitor, UiEvent, V4lAcquirer,
};
use rollcall_client::HttpClient;
use rollcall_core::date::display_label;
use rollcall_core::{selected_date, AttendanceChart, AttendanceStats, JobState};
use rollcall_hw::{Camera, FrameSampler};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const BAR_WIDTH: usize = 40;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan faces and mark attendance until interrupted
    Mark {
        /// Attendance date (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        date: Option<String>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Print the final roster as JSON
        #[arg(long)]
        json: bool,
    },
    /// Train the recognition model and follow its progress
    Train {
        /// Print the final job state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show attendance per day
    Stats {
        /// Keep refreshing until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Print the raw stats as JSON (ignored with --watch)
        #[arg(long)]
        json: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mark {
            date,
            duration,
            json,
        } => {
            let (config, client) = connect()?;
            mark(&config, client, date.as_deref(), duration, json).await
        }
        Commands::Train { json } => {
            let (config, client) = connect()?;
            train(&config, client, json).await
        }
        Commands::Stats { watch, json } => {
            let (config, client) = connect()?;
            stats(&config, client, watch, json).await
        }
        Commands::Devices => {
            print_devices();
            Ok(())
        }
    }
}

fn connect() -> Result<(Config, Arc<HttpClient>)> {
    let config = Config::from_env().context("failed to load configuration")?;
    let client = HttpClient::new(&config.server_url, config.request_timeout)
        .context("failed to build HTTP client")?;
    tracing::debug!(server = %config.server_url, "using attendance server");
    Ok((config, Arc::new(client)))
}

async fn mark(
    config: &Config,
    client: Arc<HttpClient>,
    date: Option<&str>,
    duration: Option<u64>,
    json: bool,
) -> Result<()> {
    let today = Local::now().date_naive();
    let date = selected_date(date, today)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));

    let acquirer = V4lAcquirer {
        device: config.camera_device.clone(),
        width: config.capture_width,
        height: config.capture_height,
        sampler: FrameSampler::new(config.jpeg_quality),
    };
    let controller = CaptureController::new(acquirer, client, Arc::new(tx), config.tick_interval);

    println!("Marking attendance for {}", display_label(date, today));
    controller
        .start(date)
        .await
        .with_context(|| format!("failed to start capture on {}", config.camera_device))?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = async {
            match duration {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        } => {}
    }

    let roster = controller.stop().await.unwrap_or_default();
    drop(controller);
    drain(printer).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&roster)?);
    } else {
        println!("{} marked present", roster.len());
        for entry in &roster {
            println!("  {entry}");
        }
    }
    Ok(())
}

async fn train(config: &Config, client: Arc<HttpClient>, json: bool) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));

    let monitor = TrainingMonitor::new(
        client,
        Arc::new(tx),
        config.poll_interval,
        config.max_polls,
    );
    let state = tokio::select! {
        res = monitor.trigger() => res?,
        res = tokio::signal::ctrl_c() => {
            res?;
            println!("\nStopped watching; the server keeps training.");
            return Ok(());
        }
    };
    drop(monitor);
    drain(printer).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    match state {
        JobState::Completed | JobState::Stopped { failed: false, .. } => Ok(()),
        JobState::NotStarted => bail!("training was not started"),
        other => bail!("training did not complete: {other:?}"),
    }
}

async fn stats(config: &Config, client: Arc<HttpClient>, watch: bool, json: bool) -> Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let refresher = ChartRefresher::new(client, Arc::new(tx), config.chart_refresh);

    if !watch {
        drop(rx);
        refresher
            .refresh()
            .await
            .context("failed to load attendance stats")?;
        let chart = refresher.snapshot().await;
        if json {
            let stats = AttendanceStats {
                dates: chart.labels().to_vec(),
                counts: chart.data().to_vec(),
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else if chart.labels().is_empty() {
            println!("No attendance recorded yet");
        } else {
            print!("{}", chart.render_bars(BAR_WIDTH));
        }
        return Ok(());
    }

    let printer = tokio::spawn(print_events(rx));
    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    refresher.run(cancel).await;
    ctrl_c.abort();
    drop(refresher);
    drain(printer).await;
    Ok(())
}

fn print_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for dev in devices {
        println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }
}

/// Wait briefly for the printer to flush what the controllers emitted.
async fn drain(printer: JoinHandle<()>) {
    if tokio::time::timeout(Duration::from_secs(1), printer)
        .await
        .is_err()
    {
        tracing::debug!("event printer still busy; exiting");
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<UiEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            UiEvent::CaptureStatus(status) => println!("[{status}]"),
            UiEvent::RosterPrepended(entry) => println!("+ {entry}"),
            UiEvent::Alert(text) => eprintln!("! {text}"),
            UiEvent::TrainProgress { percent } => {
                let filled = usize::from(percent) * BAR_WIDTH / 100;
                println!(
                    "[{}{}] {percent:>3}%",
                    "#".repeat(filled),
                    "-".repeat(BAR_WIDTH - filled)
                );
            }
            UiEvent::TrainMessage(message) if !message.is_empty() => println!("  {message}"),
            UiEvent::ChartRedrawn { labels, counts, .. } => {
                let mut chart = AttendanceChart::new();
                match chart.replace(AttendanceStats {
                    dates: labels,
                    counts,
                }) {
                    Ok(()) => {
                        println!("--- {} ---", Local::now().format("%H:%M:%S"));
                        print!("{}", chart.render_bars(BAR_WIDTH));
                    }
                    Err(e) => tracing::warn!(error = %e, "unrenderable chart"),
                }
            }
            UiEvent::CaptureControls {
                start_enabled,
                stop_enabled,
            } => tracing::trace!(start_enabled, stop_enabled, "capture controls"),
            UiEvent::TrainControl { enabled } => tracing::trace!(enabled, "train control"),
            UiEvent::TrainMessage(_) => {}
        }
    }
}
