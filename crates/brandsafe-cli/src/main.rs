use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use brandsafe_api::youtube::{YoutubeClient, YoutubeError};
use brandsafe_core::config::AuditConfig;
use brandsafe_core::error::CoreError;
use brandsafe_core::keywords::{self, KeywordCatalog};
use brandsafe_core::models::Keyword;
use brandsafe_core::normalize::normalize_word;
use brandsafe_runtime::{AuditOrchestrator, AuditReport, ChannelRequest, RunState, RuntimeError};

// Target directives match by prefix, so this covers every brandsafe_* crate.
const DEFAULT_FILTER: &str = "brandsafe=info";

#[derive(Parser, Debug)]
#[command(name = "brandsafe", version)]
#[command(about = "Audit YouTube videos and channels for brand safety keywords")]
struct Cli {
    /// Config file (defaults to the user config, then built-in defaults).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keyword list as a JSON array of keyword rows.
    #[arg(long, global = true, value_name = "FILE")]
    keywords: Option<PathBuf>,

    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[arg(long, global = true)]
    max_workers: Option<usize>,

    #[arg(long, global = true)]
    max_retries: Option<u32>,

    #[arg(long, global = true)]
    backoff_secs: Option<u64>,

    /// Write the report here instead of stdout.
    #[arg(long, global = true, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit videos listed one id per line.
    Videos {
        #[arg(long, value_name = "FILE")]
        ids: PathBuf,
    },
    /// Audit channels from a JSON manifest of `{channel_id, video_ids}` entries.
    Channels {
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,
    },
    /// Print the active keywords with their normalized forms.
    Keywords {
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Source(#[from] YoutubeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no keyword file given; pass --keywords or set scoring.keywords_path")]
    NoKeywords,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Keywords { file } => {
            let path = file
                .as_deref()
                .or(cli.keywords.as_deref())
                .or(config.scoring.keywords_path.as_deref())
                .ok_or(CliError::NoKeywords)?;
            let rows = keywords::load_file(path)?;
            let summary = KeywordSummary::build(&rows)?;
            write_json(&summary, cli.output.as_deref())
        }
        Command::Videos { ids } => {
            let ids = read_ids(ids)?;
            let orchestrator = build_orchestrator(&cli, &config)?;
            let cancel = cancel_on_ctrl_c();
            let report = orchestrator.run_video_audit(&ids, &cancel).await?;
            finish(&report, cli.output.as_deref())
        }
        Command::Channels { manifest } => {
            let channels = read_manifest(manifest)?;
            let orchestrator = build_orchestrator(&cli, &config)?;
            let cancel = cancel_on_ctrl_c();
            let report = orchestrator.run_channel_audit(&channels, &cancel).await?;
            finish(&report, cli.output.as_deref())
        }
    }
}

fn load_config(cli: &Cli) -> Result<AuditConfig, CoreError> {
    let mut config = match &cli.config {
        Some(path) => AuditConfig::load_from(path)?,
        None => AuditConfig::load()?,
    };
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut AuditConfig, cli: &Cli) {
    if let Some(n) = cli.batch_size {
        config.fetch.batch_size = n;
    }
    if let Some(n) = cli.max_workers {
        config.fetch.max_workers = n;
    }
    if let Some(n) = cli.max_retries {
        config.fetch.max_retries = n;
    }
    if let Some(secs) = cli.backoff_secs {
        config.fetch.backoff_secs = secs;
    }
}

fn build_orchestrator(
    cli: &Cli,
    config: &AuditConfig,
) -> Result<AuditOrchestrator<YoutubeClient>, CliError> {
    let path = cli
        .keywords
        .as_deref()
        .or(config.scoring.keywords_path.as_deref())
        .ok_or(CliError::NoKeywords)?;
    let rows = keywords::load_file(path)?;
    let client = YoutubeClient::from_config(&config.source)?;
    Ok(AuditOrchestrator::from_config(
        Arc::new(client),
        config,
        &rows,
    )?)
}

/// Cancel the run on the first Ctrl-C; batches already in flight still finish.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight batches");
            token.cancel();
        }
    });
    cancel
}

/// One id per line; blank lines and `#` comments are skipped.
fn read_ids(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn read_manifest(path: &Path) -> Result<Vec<ChannelRequest>, CliError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn finish(report: &AuditReport, output: Option<&Path>) -> Result<(), CliError> {
    if report.state == RunState::DoneWithFailures {
        warn!(
            failures = report.failures.len(),
            "Audit finished with failures; see the report's failures list"
        );
    }
    write_json(report, output)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(path = %path.display(), "Wrote report");
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct KeywordSummary {
    rows: usize,
    active: usize,
    languages: Vec<String>,
    keywords: Vec<KeywordRow>,
}

#[derive(Debug, Serialize)]
struct KeywordRow {
    word: String,
    normalized: String,
    category: String,
    language: String,
    negative_score: i32,
}

impl KeywordSummary {
    fn build(rows: &[Keyword]) -> Result<Self, CoreError> {
        let catalog = KeywordCatalog::load(rows)?;
        let active = catalog.all().keywords();

        let mut by_normalized: BTreeMap<String, usize> = BTreeMap::new();
        let keywords: Vec<KeywordRow> = active
            .iter()
            .map(|kw| {
                let normalized = normalize_word(&kw.word);
                *by_normalized.entry(normalized.clone()).or_default() += 1;
                KeywordRow {
                    word: kw.word.clone(),
                    normalized,
                    category: kw.category.to_string(),
                    language: kw.language.clone(),
                    negative_score: kw.negative_score,
                }
            })
            .collect();

        for (normalized, count) in by_normalized.iter().filter(|(_, n)| **n > 1) {
            info!(%normalized, variants = count, "Keywords share a normalized form");
        }

        Ok(Self {
            rows: rows.len(),
            active: active.len(),
            languages: catalog.languages().map(String::from).collect(),
            keywords,
        })
    }
}
