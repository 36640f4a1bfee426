mod config;
mod core;
mod dispatcher;
mod jobs;
mod judger;
mod languages;
mod monitor;
mod problem_sync;
mod queue;
mod runner;
mod transport;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::judger::JudgeContext;
use crate::languages::LanguageTable;
use crate::monitor::ProcSampler;
use crate::problem_sync::ProblemSyncCoordinator;
use crate::queue::{MissionQueue, StatusQueue};
use crate::runner::SupervisedRunner;
use crate::transport::{Coordinator, HttpCoordinator, TransportLoop};

#[derive(Debug, Parser)]
#[command(version, about = "OpenJudge judge worker node")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "/home/openjudge/conf/openjudge.toml")]
    conf: PathBuf,
    /// Log file, written in addition to stdout
    #[arg(long, default_value = "/home/openjudge/conf/openjudge.log")]
    log: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log)?;

    let config = WorkerConfig::load(&cli.conf)?;
    info!("Loaded configuration from {}", cli.conf.display());

    info!("Starting Judge Worker...");

    let clock = monitor::init_host_clock().context("Resource monitor unavailable")?;

    let languages = LanguageTable::with_overrides(&config.languages)?;
    for dir in [&config.path.work, &config.path.data] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let coordinator: Arc<dyn Coordinator> = Arc::new(HttpCoordinator::new(
        &config.server,
        config.transport.request_timeout(),
    )?);
    let missions = Arc::new(MissionQueue::new());
    let statuses = Arc::new(StatusQueue::new());

    let sync = Arc::new(ProblemSyncCoordinator::new(
        coordinator.clone(),
        config.path.data.clone(),
        missions.clone(),
        &config.sync,
    ));

    let runner = SupervisedRunner::new(
        Arc::new(ProcSampler::new(clock)),
        config.judge.poll_interval(),
    );
    let ctx = Arc::new(JudgeContext {
        paths: config.path.clone(),
        limits: config.judge.clone(),
        runner,
        status_queue: statuses.clone(),
    });

    let transport = TransportLoop::new(coordinator, statuses, sync.clone(), &config.transport);
    let transport_handle = tokio::spawn(transport.run());

    let dispatcher = Dispatcher::new(missions, sync, Arc::new(languages), ctx);

    info!("Waiting for jobs...");

    tokio::select! {
        _ = dispatcher.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    transport_handle.abort();
    Ok(())
}

/// Log to stdout and, without colors, to `log_path`
fn init_tracing(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("judge_worker=info".parse()?))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
        .init();

    Ok(())
}
