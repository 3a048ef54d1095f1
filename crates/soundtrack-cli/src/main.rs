use anyhow::{Context, Result};
use clap::Parser;
use soundtrack_acquire::{NoProgress, PageFetcher, ProgressSink};
use soundtrack_model::{BatchReport, DownloadConfig, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

mod bars;

#[derive(Parser)]
#[command(name = "soundtrack")]
#[command(about = "Download complete soundtrack albums from their album pages")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_HASH"), ")"))]
struct Cli {
    /// Album page URLs
    #[arg(required = true, value_name = "URL")]
    urls: Vec<String>,

    /// Download FLAC files over MP3 if available
    #[arg(long)]
    prefer_flac: bool,

    /// Directory to store albums in (must exist)
    #[arg(short, long, default_value = ".")]
    output_directory: PathBuf,

    /// How to store each album on disk
    #[arg(long, default_value = "directory", value_enum)]
    output_format: FormatArg,

    /// Show download progress bars
    #[arg(long)]
    progress_bar: bool,

    /// Albums downloaded at the same time
    #[arg(long, default_value_t = 2)]
    album_jobs: usize,

    /// Tracks downloaded at the same time within one album
    #[arg(long, default_value_t = 4)]
    track_jobs: usize,

    /// Upper bound on simultaneous requests across all albums
    #[arg(long, default_value_t = 8)]
    max_connections: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Write a JSON report of every album and track to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info", value_enum)]
    log_level: LogLevel,

    /// Use UTC timestamps instead of local time
    #[arg(long)]
    utc: bool,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum FormatArg {
    /// A directory of files per album
    Directory,
    /// One tar archive per album
    Tar,
    /// One zip archive per album
    Zip,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Directory => OutputFormat::Directory,
            FormatArg::Tar => OutputFormat::Tar,
            FormatArg::Zip => OutputFormat::Zip,
        }
    }
}

impl Cli {
    fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            prefer_lossless: self.prefer_flac,
            output_directory: self.output_directory.clone(),
            output_format: self.output_format.into(),
            album_concurrency: self.album_jobs,
            track_concurrency: self.track_jobs,
            max_connections: self.max_connections,
            request_timeout: Duration::from_secs(self.timeout),
            ..DownloadConfig::default()
        }
    }
}

fn init_logging(level: &LogLevel, utc: bool, writer: bars::LogWriter) {
    // Map log level, suppressing noisy HTML-parsing crates at debug/trace
    let level = match level {
        LogLevel::Error => "error",
        LogLevel::Warn  => "warn",
        LogLevel::Info  => "info",
        LogLevel::Debug => "debug,selectors=warn,html5ever=warn,hyper_util=info",
        LogLevel::Trace => "trace,selectors=warn,html5ever=warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Timestamp format: 2026-02-14 19:44:09.123 -08:00
    let time_format = "%Y-%m-%d %H:%M:%S%.3f %:z";

    if utc {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(move || writer.clone())
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(time_format.to_string()))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(move || writer.clone())
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(time_format.to_string()))
            .init();
    }
}

/// Per-album lines for the terminal, failed tracks listed under their album.
fn print_report(report: &BatchReport) {
    for album in &report.albums {
        let mark = if album.is_complete() { "ok  " } else { "FAIL" };
        match &album.error {
            Some(err) if album.tracks.is_empty() => {
                println!("{mark} {}: {err}", album.label());
                continue;
            }
            _ => println!(
                "{mark} {}: {}/{} tracks ({} resolution failed, {} download failed)",
                album.label(),
                album.succeeded(),
                album.tracks.len(),
                album.resolution_failed(),
                album.download_failed(),
            ),
        }
        if let Some(err) = &album.error {
            println!("       {err}");
        }
        for track in &album.tracks {
            if let Some(failure) = track.failure() {
                println!("       {} [{}] {failure}", track.title, failure.category());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let bars = cli.progress_bar.then(bars::ProgressBars::new);
    init_logging(
        &cli.log_level,
        cli.utc,
        bars::LogWriter::new(bars.as_ref().map(|b| b.multi().clone())),
    );

    anyhow::ensure!(
        cli.output_directory.is_dir(),
        "Output directory {} does not exist",
        cli.output_directory.display()
    );

    let config = cli.download_config();
    let fetcher = PageFetcher::new(&config).context("Failed to build HTTP client")?;
    let progress: Box<dyn ProgressSink> = match bars {
        Some(bars) => Box::new(bars),
        None => Box::new(NoProgress),
    };

    tracing::info!(albums = cli.urls.len(), prefer_flac = cli.prefer_flac, "Downloading albums");
    let report = tokio::select! {
        report = soundtrack_acquire::download_albums(&fetcher, &config, &cli.urls, progress.as_ref()) => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; unfinished files keep their .part suffix");
            return Ok(ExitCode::from(130));
        }
    };

    print_report(&report);

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, &json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), albums = report.albums.len(), "Wrote report");
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!(failed = report.failed_albums().count(), "Some albums did not download completely");
        Ok(ExitCode::FAILURE)
    }
}
