/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::model
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Normalised, validated representation of bundle metadata:
    tools, their bundle versions, OS/release variants, and the
    ordered package lists inside each variant.

  Security / Safety Notes:
    Pure data container; no I/O performed in this module.

  Dependencies:
    serde / serde_json for wire parsing and serialization.

  Operational Scope:
    Built once per invocation by a metadata source and consumed
    by exactly one render pass.

  Revision History:
    2025-02-03 COD  Introduced validated metadata model.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Validation at construction, immutability afterwards
    - Deterministic ordering for reproducible output
============================================================*/

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{BundleDocsError, Result};

/// Variant key used by tools that bundle a single package set.
pub const DEFAULT_VARIANT: &str = "default";

/// One package shipped inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageEntry {
    name: String,
    version: Option<String>,
    description: String,
}

impl PackageEntry {
    /// Validate and build an entry. An absent version is allowed, an empty one is not.
    pub fn new(
        name: impl Into<String>,
        version: Option<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BundleDocsError::InvalidPackageEntry {
                package: name,
                reason: "name must not be empty".into(),
            });
        }
        if matches!(version.as_deref(), Some("")) {
            return Err(BundleDocsError::InvalidPackageEntry {
                package: name,
                reason: "version is an empty string; omit it or use null".into(),
            });
        }
        Ok(Self {
            name,
            version,
            description: description.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Bundle version of a tool; unknown versions stay explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleVersion {
    Known(String),
    Unknown,
}

impl BundleVersion {
    /// Interpret an optional wire value; null/absent means unknown.
    pub fn parse(raw: Option<String>, context: &str) -> Result<Self> {
        match raw {
            None => Ok(BundleVersion::Unknown),
            Some(value) if value.trim().is_empty() => Err(BundleDocsError::malformed(
                context,
                "bundle version is an empty string",
            )),
            Some(value) => Ok(BundleVersion::Known(value)),
        }
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            BundleVersion::Known(value) => Some(value),
            BundleVersion::Unknown => None,
        }
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleVersion::Known(value) => f.write_str(value),
            BundleVersion::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for BundleVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_known().serialize(serializer)
    }
}

/// Bundle facts published next to a build's package list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl ArtifactInfo {
    /// Blank strings and a zero size carry no information and are dropped.
    fn normalized(self) -> Self {
        Self {
            sha256: self.sha256.filter(|value| !value.trim().is_empty()),
            file_size: self.file_size.filter(|size| *size > 0),
            arch: self.arch.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sha256.is_none() && self.file_size.is_none() && self.arch.is_none()
    }
}

/// Ordered package set for one OS/release family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    build: Option<String>,
    packages: Vec<PackageEntry>,
    artifact: ArtifactInfo,
}

impl Variant {
    pub fn new(build: Option<String>, packages: Vec<PackageEntry>) -> Result<Self> {
        if let Some(build) = build.as_deref() {
            if build.trim().is_empty() {
                return Err(BundleDocsError::malformed(
                    "variant",
                    "build identifier is an empty string",
                ));
            }
        }
        let mut seen = HashSet::new();
        for package in &packages {
            if !seen.insert(package.name()) {
                return Err(BundleDocsError::InvalidPackageEntry {
                    package: package.name().to_string(),
                    reason: "duplicate package name in one list".into(),
                });
            }
        }
        Ok(Self {
            build,
            packages,
            artifact: ArtifactInfo::default(),
        })
    }

    pub fn with_artifact(self, artifact: ArtifactInfo) -> Self {
        Self {
            artifact: artifact.normalized(),
            ..self
        }
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn packages(&self) -> &[PackageEntry] {
        &self.packages
    }

    pub fn artifact(&self) -> &ArtifactInfo {
        &self.artifact
    }
}

/// How a tool lays out its bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// One implicit package set under [`DEFAULT_VARIANT`].
    Simple,
    /// One package set per OS/release variant key.
    OsVersioned,
}

/// Everything known about one tool's published bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRelease {
    name: String,
    description: Option<String>,
    version: BundleVersion,
    kind: ToolKind,
    variants: BTreeMap<String, Variant>,
}

impl ToolRelease {
    /// Tool with one package set per OS/release variant.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        version: BundleVersion,
        variants: BTreeMap<String, Variant>,
    ) -> Result<Self> {
        Self::build(name.into(), description, version, ToolKind::OsVersioned, variants)
    }

    /// Tool with one implicit package set.
    pub fn simple(
        name: impl Into<String>,
        description: Option<String>,
        version: BundleVersion,
        variant: Variant,
    ) -> Result<Self> {
        let mut variants = BTreeMap::new();
        variants.insert(DEFAULT_VARIANT.to_string(), variant);
        Self::build(name.into(), description, version, ToolKind::Simple, variants)
    }

    fn build(
        name: String,
        description: Option<String>,
        version: BundleVersion,
        kind: ToolKind,
        variants: BTreeMap<String, Variant>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(BundleDocsError::malformed("metadata", "tool name is empty"));
        }
        if variants.is_empty() {
            return Err(BundleDocsError::malformed(&name, "tool has no package sets"));
        }
        if variants.keys().any(|key| key.trim().is_empty()) {
            return Err(BundleDocsError::malformed(&name, "variant key is empty"));
        }
        Ok(Self {
            name,
            description,
            version,
            kind,
            variants,
        })
    }

    /// Parse one tool entry of a metadata document.
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        let raw: RawToolEntry = serde_json::from_value(value.clone())
            .map_err(|err| BundleDocsError::malformed(name, err))?;
        Self::from_raw(name, raw)
    }

    /// Parse one tool entry from JSON text.
    pub fn from_json_str(name: &str, text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| BundleDocsError::malformed(name, err))?;
        Self::from_value(name, &value)
    }

    fn from_raw(name: &str, raw: RawToolEntry) -> Result<Self> {
        let version = BundleVersion::parse(raw.version, name)?;
        match (raw.packages, raw.variants) {
            (Some(packages), None) => {
                let variant = Variant::new(None, convert_packages(packages)?)?
                    .with_artifact(raw.artifact);
                Self::simple(name, raw.description, version, variant)
            }
            (None, Some(raw_variants)) => {
                if !raw.artifact.normalized().is_empty() {
                    return Err(BundleDocsError::malformed(
                        name,
                        "`sha256`, `file_size` and `arch` belong on each variant",
                    ));
                }
                let mut variants = BTreeMap::new();
                for (key, raw_variant) in raw_variants {
                    let (build, packages, artifact) = raw_variant.into_parts();
                    let variant =
                        Variant::new(build, convert_packages(packages)?)?.with_artifact(artifact);
                    variants.insert(key, variant);
                }
                Self::new(name, raw.description, version, variants)
            }
            (Some(_), Some(_)) => Err(BundleDocsError::malformed(
                name,
                "entry carries both `packages` and `variants`",
            )),
            (None, None) => Err(BundleDocsError::malformed(
                name,
                "entry carries neither `packages` nor `variants`",
            )),
        }
    }

    /// Replace the bundle version, producing a new release.
    pub fn with_version(self, version: BundleVersion) -> Self {
        Self { version, ..self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> &BundleVersion {
        &self.version
    }

    pub fn variants(&self) -> &BTreeMap<String, Variant> {
        &self.variants
    }

    pub fn variant(&self, key: &str) -> Option<&Variant> {
        self.variants.get(key)
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// True when the tool has a single implicit package set.
    pub fn is_simple(&self) -> bool {
        self.kind == ToolKind::Simple
    }
}

/// Mapping from tool name to its release; immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataModel {
    tools: BTreeMap<String, ToolRelease>,
}

impl MetadataModel {
    pub fn new(releases: impl IntoIterator<Item = ToolRelease>) -> Result<Self> {
        let mut tools = BTreeMap::new();
        for release in releases {
            let name = release.name().to_string();
            if tools.insert(name.clone(), release).is_some() {
                return Err(BundleDocsError::malformed(
                    "metadata",
                    format!("tool `{name}` appears more than once"),
                ));
            }
        }
        Ok(Self { tools })
    }

    /// Parse a whole metadata document; any invalid tool rejects the document.
    #[cfg(test)]
    pub fn from_json_str(text: &str) -> Result<Self> {
        let (releases, failures) = split_document(text, "metadata document")?;
        if let Some((_, err)) = failures.into_iter().next() {
            return Err(err);
        }
        Self::new(releases)
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolRelease> {
        self.tools.values()
    }

    #[cfg(test)]
    pub fn tool(&self, name: &str) -> Option<&ToolRelease> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Parse a document keyed by tool name, isolating failures per tool.
///
/// Only a document that is not a JSON object at all is a hard error.
pub fn split_document(
    text: &str,
    context: &str,
) -> Result<(Vec<ToolRelease>, Vec<(String, BundleDocsError)>)> {
    let document: BTreeMap<String, Value> =
        serde_json::from_str(text).map_err(|err| BundleDocsError::malformed(context, err))?;
    let mut releases = Vec::new();
    let mut failures = Vec::new();
    for (name, value) in document {
        match ToolRelease::from_value(&name, &value) {
            Ok(release) => releases.push(release),
            Err(err) => failures.push((name, err)),
        }
    }
    Ok((releases, failures))
}

/// Parse a per-build `metadata.json` body (`{"packages": [...], "sha256"?, ...}`)
/// into the variant published under `build`.
pub fn parse_build_metadata(text: &str, context: &str, build: Option<String>) -> Result<Variant> {
    let raw: RawPackageFile =
        serde_json::from_str(text).map_err(|err| BundleDocsError::malformed(context, err))?;
    Ok(Variant::new(build, convert_packages(raw.packages)?)?.with_artifact(raw.artifact))
}

fn convert_packages(raw: Vec<RawPackage>) -> Result<Vec<PackageEntry>> {
    raw.into_iter().map(RawPackage::into_entry).collect()
}

#[derive(Debug, Deserialize)]
struct RawToolEntry {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    packages: Option<Vec<RawPackage>>,
    #[serde(default, alias = "os_versions")]
    variants: Option<BTreeMap<String, RawVariant>>,
    #[serde(flatten)]
    artifact: ArtifactInfo,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVariant {
    List(Vec<RawPackage>),
    Detailed {
        #[serde(default)]
        build: Option<String>,
        packages: Vec<RawPackage>,
        #[serde(flatten)]
        artifact: ArtifactInfo,
    },
}

impl RawVariant {
    fn into_parts(self) -> (Option<String>, Vec<RawPackage>, ArtifactInfo) {
        match self {
            RawVariant::List(packages) => (None, packages, ArtifactInfo::default()),
            RawVariant::Detailed {
                build,
                packages,
                artifact,
            } => (build, packages, artifact),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPackageFile {
    packages: Vec<RawPackage>,
    #[serde(flatten)]
    artifact: ArtifactInfo,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RawPackage {
    fn into_entry(self) -> Result<PackageEntry> {
        let name = self
            .name
            .ok_or_else(|| BundleDocsError::InvalidPackageEntry {
                package: "<unnamed>".into(),
                reason: "missing required field `name`".into(),
            })?;
        let description = self
            .description
            .ok_or_else(|| BundleDocsError::InvalidPackageEntry {
                package: name.clone(),
                reason: "missing required field `description`".into(),
            })?;
        PackageEntry::new(name, self.version, description)
    }
}
