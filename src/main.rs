use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};

use oscollect::config::Config;
use oscollect::filter::TimeWindow;
use oscollect::openstack::ProviderSession;
use oscollect::pipeline::CollectionPipeline;
use oscollect::resource::reader::create_limiter;
use oscollect::resource::Resource;

/// Concurrent resource collector for OpenStack accounting
#[derive(Parser, Debug)]
#[command(name = "oscollect", version, about, long_about = None)]
struct Args {
    /// Path to the collector configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Collect records created from this time (RFC 3339)
    #[arg(long)]
    records_from: Option<DateTime<Utc>>,

    /// Collect records up to this time (RFC 3339)
    #[arg(long)]
    records_to: Option<DateTime<Utc>>,

    /// Collect records for the last period, e.g. "30d" or "12h"
    #[arg(long)]
    records_for_period: Option<String>,

    /// Write collected records to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file);

        tracing_subscriber::fmt()
            .with_max_level(tracing_level)
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .init();

        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing_level)
            .with_writer(io::stderr)
            .with_target(true)
            .init();

        Ok(None)
    }
}

/// Drains the pipeline's output stream into JSON lines.
fn spawn_record_writer(
    mut records: mpsc::Receiver<Resource>,
    output: Option<PathBuf>,
) -> JoinHandle<Result<usize>> {
    tokio::spawn(async move {
        let mut out: Box<dyn Write + Send> = match output {
            Some(path) => Box::new(BufWriter::new(
                std::fs::File::create(&path)
                    .with_context(|| format!("cannot create output file {}", path.display()))?,
            )),
            None => Box::new(io::stdout()),
        };

        let mut written = 0usize;
        while let Some(resource) = records.recv().await {
            let line = serde_json::to_string(&resource).context("cannot serialize record")?;
            writeln!(out, "{line}")?;
            written += 1;
        }
        out.flush()?;

        Ok(written)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let mut config = Config::load(args.config.as_deref())?;
    if args.records_from.is_some() {
        config.records_from = args.records_from;
    }
    if args.records_to.is_some() {
        config.records_to = args.records_to;
    }
    if args.records_for_period.is_some() {
        config.records_for_period = args.records_for_period.clone();
    }

    let window = TimeWindow::resolve(
        config.records_from,
        config.records_to,
        config.records_for_period.as_deref(),
        Utc::now(),
    )?;
    let limiter = Arc::new(create_limiter(config.rate_limit)?);
    let session = ProviderSession::new(
        &config.effective_token().unwrap_or_default(),
        config.endpoints.clone(),
        config.timeout(),
    )?;

    let pipeline = CollectionPipeline::new(session, limiter, window, config.channel_capacity);

    let (sink, records) = mpsc::channel(config.channel_capacity);
    let writer = spawn_record_writer(records, args.output.clone());

    let report = pipeline.run(sink).await?;
    let written = writer.await.context("record writer failed")??;

    info!(
        produced = report.produced,
        accepted = report.accepted,
        written,
        degraded = report.degraded,
        "collection finished"
    );
    if report.degraded > 0 {
        warn!(
            degraded = report.degraded,
            "some resource kinds were collected partially or not at all"
        );
    }

    Ok(())
}
