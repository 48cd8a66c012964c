//! gaze-ka (Kappa Analysis) - inter-rater agreement for gaze annotations
//!
//! `serve` runs the HTTP service; `analyze` compares annotation files from
//! disk and prints the report.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::signal;
use tracing::info;

use gaze_common::aggregate::{analyze, format_kappa, AnalysisOutcome, SubjectReport};
use gaze_common::config::{load_config, AnalysisConfig, RaterMode, TomlConfig, CONFIG_ENV_VAR};
use gaze_common::{AnnotationFile, RaterFile, Subject};
use gaze_ka::logging::init_tracing;
use gaze_ka::{build_router, AppState};

const MODULE: &str = "gaze-ka";

#[derive(Parser, Debug)]
#[command(name = "gaze-ka")]
#[command(about = "Inter-rater agreement (Cohen's and Fleiss' kappa) for gaze annotations")]
#[command(version)]
struct Cli {
    /// Configuration file (takes priority over GAZE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level, overriding the configured one (RUST_LOG still wins)
    #[arg(long, global = true, env = "GAZE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "GAZE_KA_PORT")]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,
    },
    /// Compare annotation files and print the agreement report
    Analyze {
        /// Annotation files, one per rater
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Rater mode: pairwise, fleiss or open
        #[arg(long)]
        mode: Option<RaterMode>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let log_level = init_tracing(cli.log_level.as_deref(), std::io::stdout)
        .context("Failed to initialise logging")?;

    let config = load_config(MODULE, cli.config.as_deref(), CONFIG_ENV_VAR)
        .context("Failed to load configuration")?;
    log_level.apply_configured(&config.logging.level);

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        host: None,
    }) {
        Command::Serve { port, host } => {
            serve(config, host, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Analyze { files, json, mode } => run_analysis(&config, &files, json, mode),
    }
}

async fn serve(config: TomlConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    info!(
        "Starting gaze Kappa Analysis (gaze-ka) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    info!(
        mode = ?config.analysis.rater_mode,
        overlap = ?config.analysis.overlap_policy,
        missing_frames = ?config.analysis.missing_frames,
        "Analysis settings"
    );

    let app = build_router(AppState::new(config));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("gaze-ka listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn load_rater(path: &Path, config: &TomlConfig) -> Result<RaterFile> {
    let file = AnnotationFile::load(path, &config.scheme)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    RaterFile::from_annotation_file(&file, &config.scheme, &config.analysis.expand_options())
        .with_context(|| format!("Failed to expand {}", path.display()))
}

fn run_analysis(
    config: &TomlConfig,
    paths: &[PathBuf],
    json: bool,
    mode: Option<RaterMode>,
) -> Result<ExitCode> {
    let raters = paths
        .iter()
        .map(|path| load_rater(path, config))
        .collect::<Result<Vec<_>>>()?;

    let analysis = AnalysisConfig {
        rater_mode: mode.unwrap_or(config.analysis.rater_mode),
        ..config.analysis.clone()
    };
    let outcome = analyze(&raters, &analysis, &config.scheme)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(match outcome {
        AnalysisOutcome::Complete { .. } => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}

fn print_outcome(outcome: &AnalysisOutcome) {
    let Some(report) = outcome.report() else {
        eprintln!("{}", outcome.summary());
        return;
    };

    println!("Files: {}", report.raters.join(", "));
    if let Some(interval) = report.interval {
        println!("Frame interval: {}", interval);
    }
    for subject in Subject::ALL {
        print_subject(report.subject(subject));
    }
}

fn print_subject(report: &SubjectReport) {
    println!();
    println!("{} gaze ({} categories)", capitalize(report.subject.as_str()), report.category_count);

    for pair in &report.pairwise {
        println!(
            "  {} vs {}: {} over {} frames",
            pair.file1,
            pair.file2,
            format_kappa(pair.result.kappa),
            pair.result.comparisons
        );
    }
    for category in &report.categories {
        println!("  {}: {}", category.label, format_kappa(category.kappa));
    }
    println!("  Mean pairwise: {}", format_kappa(report.mean_pairwise.kappa));
    if let Some(fleiss) = &report.fleiss {
        println!(
            "  Fleiss: {} over {} frames",
            format_kappa(fleiss.kappa),
            fleiss.comparisons
        );
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
