/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::render
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Turn a metadata model into in-memory artifacts: either the
    template documents rewritten between their markers, or the
    JSON index for the client-side page.

  Security / Safety Notes:
    Reads template documents only; nothing is written here.

  Dependencies:
    None beyond the crate's own modules.

  Operational Scope:
    One renderer is selected per run by the configured mode.

  Revision History:
    2025-02-03 COD  Authored markdown-docs and index renderers.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Whole artifacts rendered in memory before any write
    - Failures isolated per tool
============================================================*/

use std::cmp::Ordering;
use std::path::PathBuf;

use crate::config::ToolConfig;
use crate::error::{BundleDocsError, Result, Stage, ToolFailure};
use crate::index::{IndexBuilder, IndexDocument};
use crate::model::{MetadataModel, ToolRelease, Variant, DEFAULT_VARIANT};
use crate::source::{bundle_url, variant_bundle_url};
use crate::table::{TableFormatter, MISSING_VERSION};
use crate::template::MarkerPair;

/// A fully rendered output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Tool the artifact belongs to; `None` for artifacts covering every tool.
    pub tool: Option<String>,
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<ToolFailure>,
}

/// Produces artifacts from a model.
pub trait Renderer {
    fn render(&self, model: &MetadataModel) -> RenderOutcome;
}

/// Rewrites each tool's template document between its markers.
pub struct MarkdownDocsRenderer {
    docs_dir: PathBuf,
    tools: Vec<ToolConfig>,
    cdn_base: String,
    formatter: Box<dyn TableFormatter + Send + Sync>,
    packages_heading: String,
}

impl MarkdownDocsRenderer {
    pub fn new(
        docs_dir: impl Into<PathBuf>,
        tools: &[ToolConfig],
        cdn_base: &str,
        formatter: Box<dyn TableFormatter + Send + Sync>,
        packages_heading: impl Into<String>,
    ) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            tools: tools.to_vec(),
            cdn_base: cdn_base.trim_end_matches('/').to_string(),
            formatter,
            packages_heading: packages_heading.into(),
        }
    }

    fn tool_config(&self, name: &str) -> ToolConfig {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .cloned()
            .unwrap_or_else(|| ToolConfig::new(name))
    }

    fn render_tool(&self, release: &ToolRelease, tool: &ToolConfig) -> std::result::Result<Artifact, ToolFailure> {
        let path = tool.document_path(&self.docs_dir);
        let fail = |err: BundleDocsError| {
            ToolFailure::new(release.name(), err)
                .with_stage(Stage::Render)
                .with_document(&path)
        };
        let template = std::fs::read_to_string(&path).map_err(|err| {
            fail(BundleDocsError::Filesystem(format!(
                "Failed to read template {}: {err}",
                path.display()
            )))
        })?;
        let contents = self.render_document(release, tool, &template).map_err(fail)?;
        Ok(Artifact {
            tool: Some(release.name().to_string()),
            path: path.clone(),
            contents,
        })
    }

    /// Substitute every marker pair this release owns in `template`.
    pub fn render_document(
        &self,
        release: &ToolRelease,
        tool: &ToolConfig,
        template: &str,
    ) -> Result<String> {
        if release.is_simple() {
            return MarkerPair::content().render(template, &self.simple_section(release, tool));
        }

        let mut document = template.to_string();
        let overview = MarkerPair::content();
        if overview.present_in(&document) {
            document = overview.render(&document, &self.variant_overview(release, tool))?;
        }
        for (key, variant) in release.variants() {
            let table = self.formatter.format(variant.packages());
            document = MarkerPair::for_variant(key).render(&document, &table)?;
        }
        Ok(document)
    }

    fn simple_section(&self, release: &ToolRelease, tool: &ToolConfig) -> String {
        let artifact = tool.artifact_name();
        let mut lines = vec![format!("**Build:** `{}`", release.version()), String::new()];
        if let Some(version) = release.version().as_known() {
            let url = bundle_url(&self.cdn_base, release.name(), version, artifact);
            lines.extend(install_snippet(&url, artifact));
            lines.push(String::new());
        }
        lines.push("---".into());
        lines.push(String::new());
        lines.push(format!("## {}", self.packages_heading));
        lines.push(String::new());
        let packages = release
            .variant(DEFAULT_VARIANT)
            .map(Variant::packages)
            .unwrap_or_default();
        lines.push(self.formatter.format(packages));
        lines.join("\n")
    }

    fn variant_overview(&self, release: &ToolRelease, tool: &ToolConfig) -> String {
        let artifact = tool.artifact_name();
        let mut keys: Vec<&String> = release.variants().keys().collect();
        keys.sort_by(|a, b| compare_variant_keys(b, a));

        let mut first_url = None;
        let rows: Vec<Vec<String>> = keys
            .iter()
            .map(|key| {
                let build = release.variants()[key.as_str()].build();
                let url = build.map(|build| {
                    variant_bundle_url(&self.cdn_base, release.name(), key, build, artifact)
                });
                if first_url.is_none() {
                    first_url = url.clone();
                }
                vec![
                    key.to_string(),
                    build.unwrap_or(MISSING_VERSION).to_string(),
                    url.map(|url| format!("[Download]({url})"))
                        .unwrap_or_else(|| MISSING_VERSION.to_string()),
                ]
            })
            .collect();

        let mut lines = vec![self
            .formatter
            .format_rows(&["Variant", "Build", "Download"], &rows)];
        if let Some(url) = first_url {
            lines.push(String::new());
            lines.extend(install_snippet(&url, artifact));
        }
        lines.join("\n")
    }
}

impl Renderer for MarkdownDocsRenderer {
    fn render(&self, model: &MetadataModel) -> RenderOutcome {
        let mut outcome = RenderOutcome::default();
        for release in model.tools() {
            let tool = self.tool_config(release.name());
            match self.render_tool(release, &tool) {
                Ok(artifact) => outcome.artifacts.push(artifact),
                Err(failure) => outcome.failures.push(failure),
            }
        }
        outcome
    }
}

fn install_snippet(url: &str, artifact: &str) -> Vec<String> {
    vec![
        "```bash".into(),
        format!("curl -LO \"{url}\""),
        format!("chmod +x {artifact}"),
        "```".into(),
    ]
}

/// Order variant keys such as `8.10` and `9.2` numerically per dot segment.
fn compare_variant_keys(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Serialises the whole model into one JSON file.
pub struct JsonIndexRenderer {
    output: PathBuf,
    builder: IndexBuilder,
}

impl JsonIndexRenderer {
    pub fn new(output: impl Into<PathBuf>, builder: IndexBuilder) -> Self {
        Self {
            output: output.into(),
            builder,
        }
    }
}

impl JsonIndexRenderer {
    /// Serialise and confirm the text reads back into the same model.
    fn render_checked(&self, model: &MetadataModel) -> Result<String> {
        let contents = self.builder.build(model).to_json()?;
        if IndexDocument::from_json_str(&contents)?.into_model()? != *model {
            return Err(BundleDocsError::Runtime(
                "Index does not read back into the rendered model".into(),
            ));
        }
        Ok(contents)
    }
}

impl Renderer for JsonIndexRenderer {
    fn render(&self, model: &MetadataModel) -> RenderOutcome {
        let mut outcome = RenderOutcome::default();
        match self.render_checked(model) {
            Ok(contents) => outcome.artifacts.push(Artifact {
                tool: None,
                path: self.output.clone(),
                contents,
            }),
            Err(err) => outcome.failures.push(
                ToolFailure::new("index", err)
                    .with_stage(Stage::Render)
                    .with_document(&self.output),
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{HtmlTable, MarkdownTable};

    const SCENARIO_ONE: &str = r#"{"bintools": {"version": "20250125-2110", "packages": [{"name":"kubectl","version": null,"description":"Kubernetes CLI"}]}}"#;

    const SCENARIO_TWO: &str = r#"{"rpmtools": {"version": null, "variants": {
        "9.2": {"build": "B92", "packages": [
            {"name":"vim","version":"9.0","description":"Editor"},
            {"name":"git","version":"2.43","description":"VCS"}
        ]},
        "8.10": {"build": "B810", "packages": [{"name":"tmux","version":"3.3","description":"Multiplexer"}]}
    }}}"#;

    const SIMPLE_TEMPLATE: &str =
        "# bintools\n\nIntro.\n\n<!-- CONTENT_START -->\nold\n<!-- CONTENT_END -->\n\nFooter\n";

    const VARIANT_TEMPLATE: &str = "# rpmtools\n\n\
        <!-- CONTENT_START -->\n<!-- CONTENT_END -->\n\n\
        ## Rocky 9.2\n\n<!-- CONTENT_START:9.2 -->\n<!-- CONTENT_END:9.2 -->\n\n\
        ## Rocky 8.10\n\n<!-- CONTENT_START:8.10 -->\n<!-- CONTENT_END:8.10 -->\n";

    fn renderer(dir: &std::path::Path) -> MarkdownDocsRenderer {
        let mut rpmtools = ToolConfig::new("rpmtools");
        rpmtools.variants = true;
        rpmtools.artifact = Some("rpmtools-bundle".into());
        MarkdownDocsRenderer::new(
            dir,
            &[ToolConfig::new("bintools"), rpmtools],
            "https://cdn.example/packages",
            Box::new(MarkdownTable),
            "Packages",
        )
    }

    fn section<'a>(document: &'a str, start: &str, end: &str) -> &'a str {
        let from = document.find(start).unwrap() + start.len();
        let to = from + document[from..].find(end).unwrap();
        &document[from..to]
    }

    #[test]
    fn scenario_one_renders_placeholder_row() {
        let model = MetadataModel::from_json_str(SCENARIO_ONE).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let release = model.tool("bintools").unwrap();
        let out = r
            .render_document(release, &ToolConfig::new("bintools"), SIMPLE_TEMPLATE)
            .unwrap();

        let body = section(&out, "<!-- CONTENT_START -->", "<!-- CONTENT_END -->");
        assert!(body.contains("**Build:** `20250125-2110`"));
        assert!(body.contains(
            "curl -LO \"https://cdn.example/packages/bintools/20250125-2110/bintools\""
        ));
        assert!(body.contains("## Packages"));
        let table: Vec<&str> = body.lines().filter(|line| line.starts_with('|')).collect();
        assert_eq!(
            table,
            [
                "| Name | Version | Description |",
                "| --- | --- | --- |",
                "| kubectl | - | Kubernetes CLI |"
            ]
        );
        assert!(out.starts_with("# bintools\n\nIntro.\n\n<!-- CONTENT_START -->\n"));
        assert!(out.ends_with("<!-- CONTENT_END -->\n\nFooter\n"));
    }

    #[test]
    fn unknown_version_omits_download_snippet() {
        let model =
            MetadataModel::from_json_str(r#"{"bintools": {"packages": []}}"#).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let out = r
            .render_document(model.tool("bintools").unwrap(), &ToolConfig::new("bintools"), SIMPLE_TEMPLATE)
            .unwrap();
        assert!(out.contains("**Build:** `unknown`"));
        assert!(!out.contains("curl"));
    }

    #[test]
    fn scenario_two_renders_one_table_per_variant() {
        let model = MetadataModel::from_json_str(SCENARIO_TWO).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let tool = r.tool_config("rpmtools");
        let out = r
            .render_document(model.tool("rpmtools").unwrap(), &tool, VARIANT_TEMPLATE)
            .unwrap();

        let nine = section(&out, "<!-- CONTENT_START:9.2 -->", "<!-- CONTENT_END:9.2 -->");
        assert!(nine.contains("| vim | 9.0 | Editor |"));
        assert!(nine.contains("| git | 2.43 | VCS |"));
        assert!(nine.find("vim").unwrap() < nine.find("git").unwrap());
        assert!(!nine.contains("tmux"));

        let eight = section(&out, "<!-- CONTENT_START:8.10 -->", "<!-- CONTENT_END:8.10 -->");
        assert!(eight.contains("| tmux | 3.3 | Multiplexer |"));
        assert!(!eight.contains("vim"));

        let overview = section(&out, "<!-- CONTENT_START -->", "<!-- CONTENT_END -->");
        assert!(overview.find("| 9.2 |").unwrap() < overview.find("| 8.10 |").unwrap());
        assert!(overview.contains(
            "curl -LO \"https://cdn.example/packages/rpmtools/9.2/B92/rpmtools-bundle\""
        ));
        assert!(overview.contains("chmod +x rpmtools-bundle"));
        assert!(overview.contains(
            "| 9.2 | B92 | [Download](https://cdn.example/packages/rpmtools/9.2/B92/rpmtools-bundle) |"
        ));
    }

    #[test]
    fn variant_named_default_renders_its_own_section() {
        let text = r#"{"rpmtools": {"variants": {"default": {"build": "B1", "packages": [
            {"name":"vim","version":"9.0","description":"Editor"}
        ]}}}}"#;
        let model = MetadataModel::from_json_str(text).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let template = "# rpmtools\n\n<!-- CONTENT_START -->\nold\n<!-- CONTENT_END -->\n\n\
            <!-- CONTENT_START:default -->\nold\n<!-- CONTENT_END:default -->\n";
        let out = r
            .render_document(model.tool("rpmtools").unwrap(), &r.tool_config("rpmtools"), template)
            .unwrap();

        let section_body = section(&out, "<!-- CONTENT_START:default -->", "<!-- CONTENT_END:default -->");
        assert!(section_body.contains("| vim | 9.0 | Editor |"));
        assert!(!section_body.contains("old"));
        let overview = section(&out, "<!-- CONTENT_START -->", "<!-- CONTENT_END -->");
        assert!(overview.contains("| default | B1 | [Download]("));
        assert!(!overview.contains("**Build:**"));
    }

    #[test]
    fn rendering_twice_is_byte_identical() {
        let model = MetadataModel::from_json_str(SCENARIO_TWO).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let tool = r.tool_config("rpmtools");
        let release = model.tool("rpmtools").unwrap();
        let once = r.render_document(release, &tool, VARIANT_TEMPLATE).unwrap();
        let twice = r.render_document(release, &tool, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn absent_variant_leaves_its_pair_untouched() {
        let text = r#"{"rpmtools": {"variants": {"9.2": [{"name":"vim","version":"9.0","description":"Editor"}]}}}"#;
        let model = MetadataModel::from_json_str(text).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let template = VARIANT_TEMPLATE.replace(
            "<!-- CONTENT_START:8.10 -->\n",
            "<!-- CONTENT_START:8.10 -->\nkeep me\n",
        );
        let out = r
            .render_document(model.tool("rpmtools").unwrap(), &r.tool_config("rpmtools"), &template)
            .unwrap();
        assert!(out.contains("<!-- CONTENT_START:8.10 -->\nkeep me\n<!-- CONTENT_END:8.10 -->"));
    }

    #[test]
    fn present_but_empty_variant_renders_header_only() {
        let text = r#"{"rpmtools": {"variants": {"9.2": [], "8.10": []}}}"#;
        let model = MetadataModel::from_json_str(text).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let out = r
            .render_document(model.tool("rpmtools").unwrap(), &r.tool_config("rpmtools"), VARIANT_TEMPLATE)
            .unwrap();
        let nine = section(&out, "<!-- CONTENT_START:9.2 -->", "<!-- CONTENT_END:9.2 -->");
        assert_eq!(nine, "\n| Name | Version | Description |\n| --- | --- | --- |\n");
    }

    #[test]
    fn variant_without_markers_is_a_hard_failure() {
        let model = MetadataModel::from_json_str(SCENARIO_TWO).unwrap();
        let r = renderer(std::path::Path::new("docs"));
        let template = "# rpmtools\n<!-- CONTENT_START:9.2 -->\n<!-- CONTENT_END:9.2 -->\n";
        let err = r
            .render_document(model.tool("rpmtools").unwrap(), &r.tool_config("rpmtools"), template)
            .unwrap_err();
        assert!(matches!(err, BundleDocsError::MarkerNotFound { ref marker } if marker.contains("8.10")));
    }

    #[test]
    fn render_isolates_failures_per_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bintools.md"), SIMPLE_TEMPLATE).unwrap();
        std::fs::write(dir.path().join("rpmtools.md"), "no markers at all\n").unwrap();

        let text = r#"{
            "bintools": {"version": "1", "packages": [{"name":"jq","description":"JSON"}]},
            "rpmtools": {"variants": {"9.2": []}}
        }"#;
        let model = MetadataModel::from_json_str(text).unwrap();
        let outcome = renderer(dir.path()).render(&model);

        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].tool.as_deref(), Some("bintools"));
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.tool, "rpmtools");
        assert_eq!(failure.stage, Stage::Render);
        assert_eq!(failure.document.as_deref(), Some(dir.path().join("rpmtools.md").as_path()));
    }

    #[test]
    fn missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let model = MetadataModel::from_json_str(SCENARIO_ONE).unwrap();
        let outcome = renderer(dir.path()).render(&model);
        assert!(outcome.artifacts.is_empty());
        assert!(matches!(outcome.failures[0].error, BundleDocsError::Filesystem(_)));
    }

    #[test]
    fn html_style_is_supported() {
        let model = MetadataModel::from_json_str(SCENARIO_ONE).unwrap();
        let r = MarkdownDocsRenderer::new(
            "docs",
            &[ToolConfig::new("bintools")],
            "https://cdn.example",
            Box::new(HtmlTable),
            "Packages",
        );
        let out = r
            .render_document(model.tool("bintools").unwrap(), &ToolConfig::new("bintools"), SIMPLE_TEMPLATE)
            .unwrap();
        assert!(out.contains("<tr><td>kubectl</td><td>-</td><td>Kubernetes CLI</td></tr>"));
    }

    #[test]
    fn variant_keys_sort_numerically() {
        let mut keys = vec!["8.10", "10.0", "9.2", "8.9"];
        keys.sort_by(|a, b| compare_variant_keys(b, a));
        assert_eq!(keys, ["10.0", "9.2", "8.10", "8.9"]);
    }

    #[test]
    fn index_renderer_emits_single_artifact() {
        let model = MetadataModel::from_json_str(SCENARIO_ONE).unwrap();
        let renderer = JsonIndexRenderer::new(
            "docs/data/packages.json",
            IndexBuilder::new("https://cdn.example", &[ToolConfig::new("bintools")]),
        );
        let outcome = renderer.render(&model);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].tool, None);
        assert!(outcome.artifacts[0].contents.ends_with("}\n"));
    }
}
