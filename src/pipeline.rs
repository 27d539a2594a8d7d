/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::pipeline
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Run one render pass: fetch metadata, render with the
    configured renderer, and persist artifacts atomically while
    reporting every failed tool.

  Security / Safety Notes:
    Writes only to the configured docs directory and index
    path; a failed tool never leaves a partial file behind.

  Dependencies:
    chrono for the optional index timestamp.

  Operational Scope:
    Called once by main per invocation.

  Revision History:
    2025-02-03 COD  Authored render pipeline.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Failures isolated per tool, never swallowed
    - Whole-file atomic writes
    - Unchanged documents are left untouched on disk
============================================================*/

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use crate::config::{BundleDocsConfig, RenderMode, ToolConfig};
use crate::error::{BundleDocsError, Result, Stage, ToolFailure};
use crate::index::IndexBuilder;
use crate::logger::Logger;
use crate::render::{Artifact, JsonIndexRenderer, MarkdownDocsRenderer, Renderer};
use crate::source::MetadataSource;

/// What a render pass did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    /// Artifacts rendered but not written because of `--dry-run`.
    pub planned: Vec<(PathBuf, usize)>,
    pub skipped: Vec<(String, String)>,
    pub failures: Vec<ToolFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Select the renderer for the configured mode.
pub fn build_renderer(config: &BundleDocsConfig, tools: &[ToolConfig]) -> Box<dyn Renderer> {
    match config.mode {
        RenderMode::Markdown => Box::new(MarkdownDocsRenderer::new(
            &config.docs_dir,
            tools,
            &config.cdn.base_url,
            config.table_style.formatter(),
            config.packages_heading.clone(),
        )),
        RenderMode::Index => {
            let mut builder = IndexBuilder::new(&config.cdn.base_url, tools);
            if config.include_generated_at {
                builder =
                    builder.generated_at(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            Box::new(JsonIndexRenderer::new(&config.index_output, builder))
        }
    }
}

/// Fetch, render, and write.
///
/// `Err` is returned only when the source as a whole is unusable, or when
/// index mode has nothing to publish; in both cases nothing is written.
pub async fn execute(
    config: &BundleDocsConfig,
    tools: &[ToolConfig],
    source: &MetadataSource,
    dry_run: bool,
    logger: &Logger,
) -> Result<RunReport> {
    logger.info("SOURCE", format!("Fetching metadata from {}", source.describe()));
    let fetched = source.fetch(tools).await?;

    let mut report = RunReport {
        skipped: fetched.skipped,
        failures: fetched.failures,
        ..RunReport::default()
    };
    for (tool, reason) in &report.skipped {
        logger.warn("SKIP", format!("{tool}: {reason}"));
    }
    for failure in &report.failures {
        logger.failure(failure);
    }
    let model = fetched.model;
    logger.info("FETCH", format!("{} tool(s) in model", model.len()));
    for release in model.tools() {
        logger.info(
            "FETCH",
            format!(
                "{} version={} variants={}",
                release.name(),
                release.version(),
                release.variants().len()
            ),
        );
    }

    if config.mode == RenderMode::Index {
        if model.is_empty() {
            return Err(BundleDocsError::Runtime(
                "No tool metadata available; index not written".into(),
            ));
        }
        if !report.failures.is_empty() {
            logger.warn(
                "WRITE",
                format!(
                    "Index {} left unchanged because {} tool(s) failed",
                    config.index_output.display(),
                    report.failures.len()
                ),
            );
            return Ok(report);
        }
    } else if model.is_empty() {
        logger.warn("RENDER", "No tool metadata available; nothing to render");
        return Ok(report);
    }

    let rendered = build_renderer(config, tools).render(&model);
    for failure in &rendered.failures {
        logger.failure(failure);
    }
    report.failures.extend(rendered.failures);

    for artifact in rendered.artifacts {
        persist(artifact, dry_run, logger, &mut report);
    }
    Ok(report)
}

fn persist(artifact: Artifact, dry_run: bool, logger: &Logger, report: &mut RunReport) {
    let label = artifact.tool.clone().unwrap_or_else(|| "index".to_string());
    if dry_run {
        logger.info(
            "RENDER",
            format!(
                "{label}: {} bytes for {} (dry-run)",
                artifact.contents.len(),
                artifact.path.display()
            ),
        );
        report
            .planned
            .push((artifact.path, artifact.contents.len()));
        return;
    }

    logger.debug(
        "RENDER",
        format!("{label}: {} bytes rendered", artifact.contents.len()),
    );
    if fs::read_to_string(&artifact.path).ok().as_deref() == Some(artifact.contents.as_str()) {
        logger.info("WRITE", format!("{label}: {} unchanged", artifact.path.display()));
        report.unchanged.push(artifact.path);
        return;
    }

    match write_atomic(&artifact.path, &artifact.contents) {
        Ok(()) => {
            logger.info("WRITE", format!("{label}: wrote {}", artifact.path.display()));
            report.written.push(artifact.path);
        }
        Err(err) => {
            let failure = ToolFailure::new(label, err)
                .with_stage(Stage::Write)
                .with_document(&artifact.path);
            logger.failure(&failure);
            report.failures.push(failure);
        }
    }
}

/// Write `contents` to a sibling temporary file, then rename it over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| {
        BundleDocsError::Filesystem(format!(
            "Failed to create directory {}: {err}",
            parent.display()
        ))
    })?;

    let file_name = path
        .file_name()
        .ok_or_else(|| BundleDocsError::Filesystem(format!("Not a file path: {}", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = parent.join(tmp_name);

    let result = fs::File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp_path, path));
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(BundleDocsError::Filesystem(format!(
            "Failed to write {}: {err}",
            path.display()
        )));
    }
    Ok(())
}
