/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Bundle-Docs Core. Fetches published bundle
    metadata and renders it into the documentation site, either
    as tables between template markers or as a JSON index.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTPS GET requests
    only and writes solely to configured documentation paths.

  Dependencies:
    clap for CLI parsing, chrono for session stamps.

  Operational Scope:
    Invoked on demand by the documentation workflow, or by
    operators regenerating package pages locally.

  Revision History:
    2025-02-03 COD  Authored Bundle-Docs Core runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod config;
mod error;
mod index;
mod logger;
mod model;
mod pipeline;
mod render;
mod source;
mod table;
mod template;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Parser};

use config::{BundleDocsConfig, RenderMode, SourceKind};
use error::Result;
use logger::Logger;
use pipeline::{execute, RunReport};
use source::MetadataSource;

/// Command-line arguments for Bundle-Docs-Core.
#[derive(Debug, Parser)]
#[command(
    name = "Bundle-Docs-Core",
    version,
    author = "Synavera Systems",
    about = "Renders air-gapped bundle metadata into documentation"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Output variant to produce.
    #[arg(long, value_enum)]
    mode: Option<RenderMode>,
    /// Metadata source strategy.
    #[arg(long, value_enum)]
    source: Option<SourceKind>,
    /// URL of the complete metadata document (remote source).
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    /// Directory holding the template documents.
    #[arg(long, value_name = "PATH")]
    docs_dir: Option<PathBuf>,
    /// Path of the JSON index (index mode).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Limit the run to specific tools.
    #[arg(long = "tool", value_name = "NAME", action = ArgAction::Append)]
    tools: Vec<String>,
    /// Render everything but write nothing.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut BundleDocsConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(url) = &self.url {
            config.remote.url = Some(url.clone());
        }
        if let Some(docs_dir) = &self.docs_dir {
            config.docs_dir = docs_dir.clone();
        }
        if let Some(output) = &self.output {
            config.index_output = output.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[Bundle-Docs-Core] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = BundleDocsConfig::load_from_optional_path(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;
    let tools = config.select_tools(&cli.tools)?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .unwrap_or_else(|| config.log_dir().join(format!("render_{session_stamp}.log")));
    let logger = Logger::new(Some(log_path), cli.verbose)?;
    logger.info("INIT", "Bundle-Docs Core awakening.");
    logger.info(
        "CONFIG",
        format!(
            "mode={:?} source={:?} tools={}",
            config.mode,
            config.source,
            tools
                .iter()
                .map(|tool| tool.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ),
    );

    let vars: HashMap<String, String> = std::env::vars().collect();
    let source = MetadataSource::from_config(&config, vars)?;

    let report = match execute(&config, &tools, &source, cli.dry_run, &logger).await {
        Ok(report) => report,
        Err(err) => {
            logger.error("FAIL", err.to_string());
            logger.finalize()?;
            return Err(err);
        }
    };

    if cli.dry_run {
        print_summary(&report);
    }
    logger.info(
        "SUMMARY",
        format!(
            "written={} unchanged={} skipped={} failed={}",
            report.written.len(),
            report.unchanged.len(),
            report.skipped.len(),
            report.failures.len()
        ),
    );

    let code = if report.is_success() {
        logger.info("COMPLETE", "Documentation synchronised.");
        ExitCode::SUCCESS
    } else {
        for failure in &report.failures {
            eprintln!("[Bundle-Docs-Core] {failure}");
        }
        report.failures[0].error.exit_code()
    };
    logger.finalize()?;
    Ok(code)
}

fn print_summary(report: &RunReport) {
    for (path, bytes) in &report.planned {
        println!("→ {} ({bytes} bytes)", path.display());
    }
    println!(
        "→ Render dry-run. Artifacts={} Skipped={} Failed={}",
        report.planned.len(),
        report.skipped.len(),
        report.failures.len()
    );
}
