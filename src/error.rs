/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Bundle-Docs error types so that every failed
    tool is reported with a stage, a document, and a stable
    exit code.

  Security / Safety Notes:
    Error contexts expose URLs and document paths only; no
    payload bodies are echoed back to operators.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate failures and consolidate
    exit codes for the binary entry point.

  Revision History:
    2025-02-03 COD  Established render pipeline error taxonomy.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for Bundle-Docs operations.
pub type Result<T> = std::result::Result<T, BundleDocsError>;

/// Enumerates high-level error domains surfaced by Bundle-Docs.
#[derive(Debug, Error)]
pub enum BundleDocsError {
    #[error("Source unavailable at {url}: {reason}")]
    SourceUnavailable { url: String, reason: String },
    #[error("Malformed metadata in {context}: {reason}")]
    MalformedMetadata { context: String, reason: String },
    #[error("Marker `{marker}` not found")]
    MarkerNotFound { marker: String },
    #[error("Marker `{end}` does not follow `{start}`")]
    MarkersOutOfOrder { start: String, end: String },
    #[error("Generated content contains marker `{marker}`")]
    MarkerInReplacement { marker: String },
    #[error("Invalid package entry `{package}`: {reason}")]
    InvalidPackageEntry { package: String, reason: String },
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BundleDocsError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            BundleDocsError::Config(_) => 20,
            BundleDocsError::SourceUnavailable { .. } => 30,
            BundleDocsError::MalformedMetadata { .. } => 31,
            BundleDocsError::InvalidPackageEntry { .. } => 32,
            BundleDocsError::MarkerNotFound { .. } => 35,
            BundleDocsError::MarkersOutOfOrder { .. } => 36,
            BundleDocsError::MarkerInReplacement { .. } => 37,
            BundleDocsError::Filesystem(_) => 40,
            BundleDocsError::Io(_) => 41,
            BundleDocsError::Runtime(_) => 50,
        }
    }

    pub(crate) fn malformed(context: impl Into<String>, reason: impl fmt::Display) -> Self {
        BundleDocsError::MalformedMetadata {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// Pipeline stage at which a tool failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Render,
    Write,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Render => "render",
            Stage::Write => "write",
        }
    }

    /// Classify an error by the stage that produces it.
    pub fn of(error: &BundleDocsError) -> Self {
        match error {
            BundleDocsError::SourceUnavailable { .. } => Stage::Fetch,
            BundleDocsError::MalformedMetadata { .. }
            | BundleDocsError::InvalidPackageEntry { .. } => Stage::Parse,
            BundleDocsError::Filesystem(_) | BundleDocsError::Io(_) => Stage::Write,
            _ => Stage::Render,
        }
    }
}

/// A failure isolated to a single tool.
#[derive(Debug)]
pub struct ToolFailure {
    pub tool: String,
    pub stage: Stage,
    pub document: Option<PathBuf>,
    pub error: BundleDocsError,
}

impl ToolFailure {
    pub fn new(tool: impl Into<String>, error: BundleDocsError) -> Self {
        Self {
            tool: tool.into(),
            stage: Stage::of(&error),
            document: None,
            error,
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_document(mut self, document: impl Into<PathBuf>) -> Self {
        self.document = Some(document.into());
        self
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool={} stage={}", self.tool, self.stage.as_str())?;
        if let Some(document) = &self.document {
            write!(f, " document={}", document.display())?;
        }
        write!(f, ": {}", self.error)
    }
}
