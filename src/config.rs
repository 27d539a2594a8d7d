/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load Bundle-Docs configuration from TOML, supply defaults
    mirroring the published bundle catalogue, and validate the
    effective settings after CLI overrides.

  Security / Safety Notes:
    Reads operator-controlled files only. Environment variable
    names are configured here; their values are read in main.

  Dependencies:
    serde + toml for parsing, dirs for platform directories.

  Operational Scope:
    Consumed once at startup by the binary entry point.

  Revision History:
    2025-02-03 COD  Authored configuration layer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Every key defaulted; an empty file is a valid config
    - Explicit validation with actionable messages
============================================================*/

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{BundleDocsError, Result};
use crate::table::TableStyle;

/// Default CDN root under which bundles and their metadata are published.
pub const DEFAULT_CDN_BASE: &str = "https://files.project-jelly.io/packages";

const LOCAL_CONFIG: &str = "bundledocs.toml";

/// Which output the render pass produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Rewrite template documents between their markers.
    #[default]
    Markdown,
    /// Write one JSON index for the client-side page.
    Index,
}

/// Where metadata comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// One GET of a complete metadata document.
    Remote,
    /// Version strings and payloads from environment variables, no network.
    Inline,
    /// Version strings from environment variables, package lists from the CDN.
    #[default]
    Cdn,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BundleDocsConfig {
    pub mode: RenderMode,
    pub source: SourceKind,
    pub docs_dir: PathBuf,
    pub index_output: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub table_style: TableStyle,
    pub packages_heading: String,
    pub include_generated_at: bool,
    pub http: HttpConfig,
    pub remote: RemoteConfig,
    pub cdn: CdnConfig,
    pub tools: Vec<ToolConfig>,
}

impl Default for BundleDocsConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            source: SourceKind::default(),
            docs_dir: PathBuf::from("docs"),
            index_output: PathBuf::from("docs/data/packages.json"),
            log_dir: None,
            table_style: TableStyle::default(),
            packages_heading: "Packages".into(),
            include_generated_at: false,
            http: HttpConfig::default(),
            remote: RemoteConfig::default(),
            cdn: CdnConfig::default(),
            tools: default_tools(),
        }
    }
}

/// HTTP client settings shared by the remote and CDN sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    pub user_agent: String,
    pub max_parallel_requests: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            user_agent: format!("Bundle-Docs/{} (linux)", env!("CARGO_PKG_VERSION")),
            max_parallel_requests: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// URL of the complete metadata document.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    pub base_url: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CDN_BASE.into(),
        }
    }
}

/// One entry of the tool registry.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Template path relative to `docs_dir`; defaults to `<name>.md`.
    #[serde(default)]
    pub document: Option<PathBuf>,
    /// Bundle file name on the CDN; defaults to the tool name.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Tool publishes one package set per OS/release variant.
    #[serde(default)]
    pub variants: bool,
    #[serde(default)]
    pub version_env: Option<String>,
    #[serde(default)]
    pub variants_env: Option<String>,
    #[serde(default)]
    pub payload_env: Option<String>,
}

impl ToolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            document: None,
            artifact: None,
            variants: false,
            version_env: None,
            variants_env: None,
            payload_env: None,
        }
    }

    pub fn document_path(&self, docs_dir: &Path) -> PathBuf {
        match &self.document {
            Some(document) => docs_dir.join(document),
            None => docs_dir.join(format!("{}.md", self.name)),
        }
    }

    pub fn artifact_name(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    /// Variable holding the bundle version of a simple tool.
    pub fn version_var(&self) -> String {
        self.version_env
            .clone()
            .unwrap_or_else(|| format!("{}_VERSION", env_stem(&self.name)))
    }

    /// Variable holding the variant → build JSON object of a variant tool.
    pub fn variants_var(&self) -> String {
        self.variants_env
            .clone()
            .unwrap_or_else(|| format!("{}_DATA", env_stem(&self.name)))
    }

    /// Variable holding an inline tool-entry JSON payload.
    pub fn payload_var(&self) -> String {
        self.payload_env
            .clone()
            .unwrap_or_else(|| format!("{}_PAYLOAD", env_stem(&self.name)))
    }
}

fn env_stem(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn default_tools() -> Vec<ToolConfig> {
    let mut bintools = ToolConfig::new("bintools");
    bintools.description = Some("Go binary package manager".into());

    let mut snaptools = ToolConfig::new("snaptools");
    snaptools.description = Some("Snap package bundler".into());
    snaptools.artifact = Some("snaptools-bundle".into());

    let mut rpmtools = ToolConfig::new("rpmtools");
    rpmtools.description = Some("RPM package bundler".into());
    rpmtools.artifact = Some("rpmtools-bundle".into());
    rpmtools.variants = true;

    let mut debtools = ToolConfig::new("debtools");
    debtools.description = Some("DEB package bundler".into());
    debtools.artifact = Some("debtools-bundle".into());
    debtools.variants = true;

    let mut nvidia = ToolConfig::new("nvidia-rpmtools");
    nvidia.description = Some("NVIDIA B200 NVSwitch package bundler (RPM)".into());
    nvidia.artifact = Some("nvidia-rpmtools-bundle".into());
    nvidia.variants = true;

    vec![bintools, snaptools, rpmtools, debtools, nvidia]
}

impl BundleDocsConfig {
    /// Load from an explicit path, or discover a config file, or fall back to defaults.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::discover() {
                Some(found) => Self::load(&found),
                None => Ok(Self::default()),
            },
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("bundledocs").join("config.toml"))
            .filter(|candidate| candidate.is_file())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            BundleDocsError::Config(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|err| BundleDocsError::Config(format!("{}: {err}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Directory for session logs.
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::state_dir()
                .or_else(dirs::cache_dir)
                .unwrap_or_else(std::env::temp_dir)
                .join("bundledocs")
                .join("logs")
        })
    }

    /// Check the effective configuration after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        if self.tools.is_empty() {
            return Err(BundleDocsError::Config("No tools configured".into()));
        }
        let mut names = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(BundleDocsError::Config("Tool with empty name".into()));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(BundleDocsError::Config(format!(
                    "Tool `{}` configured more than once",
                    tool.name
                )));
            }
        }
        if self.http.timeout == 0 {
            return Err(BundleDocsError::Config("http.timeout must be positive".into()));
        }
        if self.http.max_parallel_requests == 0 {
            return Err(BundleDocsError::Config(
                "http.max_parallel_requests must be at least 1".into(),
            ));
        }
        if self.source == SourceKind::Remote
            && self.remote.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(BundleDocsError::Config(
                "Remote source selected but no remote.url configured".into(),
            ));
        }
        Ok(())
    }

    /// Tools selected for this run, in registry order.
    pub fn select_tools(&self, requested: &[String]) -> Result<Vec<ToolConfig>> {
        if requested.is_empty() {
            return Ok(self.tools.clone());
        }
        let unknown: Vec<&str> = requested
            .iter()
            .filter(|name| !self.tools.iter().any(|tool| &tool.name == *name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(BundleDocsError::Config(format!(
                "Unknown tool(s): {}",
                unknown.join(", ")
            )));
        }
        Ok(self
            .tools
            .iter()
            .filter(|tool| requested.contains(&tool.name))
            .cloned()
            .collect())
    }
}
