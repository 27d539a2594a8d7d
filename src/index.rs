/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::index
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Serialise the full metadata model into the single JSON
    index consumed by the browser-side package page, and read
    such an index back into a model.

  Security / Safety Notes:
    Output is written to operator-controlled paths; no
    privileged operations are performed.

  Dependencies:
    serde / serde_json for JSON serialization.

  Operational Scope:
    Active when the render mode is `index`.

  Revision History:
    2025-02-03 COD  Authored index builder.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering for reproducible artifacts
    - Explicit nulls for unknown versions
============================================================*/

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::ToolConfig;
use crate::error::{BundleDocsError, Result};
use crate::model::{
    ArtifactInfo, BundleVersion, MetadataModel, PackageEntry, ToolKind, ToolRelease, Variant,
    DEFAULT_VARIANT,
};
use crate::source::{bundle_url, variant_bundle_url};

/// Root of the JSON index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    pub cdn_base: String,
    pub tools: BTreeMap<String, IndexTool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTool {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ToolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Always present; `null` when the bundle version is unknown.
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub variants: BTreeMap<String, IndexVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(flatten)]
    pub artifact: ArtifactInfo,
    pub packages: Vec<IndexPackage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPackage {
    pub name: String,
    pub version: Option<String>,
    pub description: String,
}

/// Builds an [`IndexDocument`] from a model.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    cdn_base: String,
    artifacts: HashMap<String, String>,
    generated_at: Option<String>,
}

impl IndexBuilder {
    pub fn new(cdn_base: &str, tools: &[ToolConfig]) -> Self {
        Self {
            cdn_base: cdn_base.trim_end_matches('/').to_string(),
            artifacts: tools
                .iter()
                .map(|tool| (tool.name.clone(), tool.artifact_name().to_string()))
                .collect(),
            generated_at: None,
        }
    }

    /// Stamp the document; leave unset for byte-stable output.
    pub fn generated_at(mut self, stamp: impl Into<String>) -> Self {
        self.generated_at = Some(stamp.into());
        self
    }

    pub fn build(&self, model: &MetadataModel) -> IndexDocument {
        let tools = model
            .tools()
            .map(|release| (release.name().to_string(), self.build_tool(release)))
            .collect();
        IndexDocument {
            generated_at: self.generated_at.clone(),
            cdn_base: self.cdn_base.clone(),
            tools,
        }
    }

    fn build_tool(&self, release: &ToolRelease) -> IndexTool {
        let name = release.name();
        let artifact = self
            .artifacts
            .get(name)
            .map(String::as_str)
            .unwrap_or(name);
        let version = release.version().as_known();

        let download_url = if release.is_simple() {
            version.map(|version| bundle_url(&self.cdn_base, name, version, artifact))
        } else {
            None
        };

        let variants = release
            .variants()
            .iter()
            .map(|(key, variant)| {
                let download_url = if release.is_simple() {
                    None
                } else {
                    variant
                        .build()
                        .map(|build| variant_bundle_url(&self.cdn_base, name, key, build, artifact))
                };
                let packages = variant
                    .packages()
                    .iter()
                    .map(|entry| IndexPackage {
                        name: entry.name().to_string(),
                        version: entry.version().map(str::to_string),
                        description: entry.description().to_string(),
                    })
                    .collect();
                (
                    key.clone(),
                    IndexVariant {
                        build: variant.build().map(str::to_string),
                        download_url,
                        artifact: variant.artifact().clone(),
                        packages,
                    },
                )
            })
            .collect();

        IndexTool {
            name: name.to_string(),
            kind: release.kind(),
            description: release.description().map(str::to_string),
            version: version.map(str::to_string),
            download_url,
            variants,
        }
    }
}

impl IndexDocument {
    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self).map_err(|err| {
            BundleDocsError::Runtime(format!("Failed to serialise index: {err}"))
        })?;
        text.push('\n');
        Ok(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| BundleDocsError::malformed("index", err))
    }

    /// Rebuild the model this index was produced from. Derived URLs are dropped.
    pub fn into_model(self) -> Result<MetadataModel> {
        let mut releases = Vec::with_capacity(self.tools.len());
        for (key, tool) in self.tools {
            if tool.name != key {
                return Err(BundleDocsError::malformed(
                    "index",
                    format!("tool key `{key}` does not match name `{}`", tool.name),
                ));
            }
            let version = BundleVersion::parse(tool.version, &key)?;
            let mut variants = BTreeMap::new();
            for (variant_key, variant) in tool.variants {
                let packages = variant
                    .packages
                    .into_iter()
                    .map(|package| PackageEntry::new(package.name, package.version, package.description))
                    .collect::<Result<Vec<_>>>()?;
                let rebuilt = Variant::new(variant.build, packages)?.with_artifact(variant.artifact);
                variants.insert(variant_key, rebuilt);
            }
            let release = match tool.kind {
                ToolKind::OsVersioned => ToolRelease::new(key, tool.description, version, variants)?,
                ToolKind::Simple => {
                    let only = variants.remove(DEFAULT_VARIANT);
                    match only {
                        Some(variant) if variants.is_empty() => {
                            ToolRelease::simple(key, tool.description, version, variant)?
                        }
                        _ => {
                            return Err(BundleDocsError::malformed(
                                "index",
                                format!("simple tool `{key}` must have exactly one `{DEFAULT_VARIANT}` variant"),
                            ))
                        }
                    }
                }
            };
            releases.push(release);
        }
        MetadataModel::new(releases)
    }
}
