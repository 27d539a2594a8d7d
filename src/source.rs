/*============================================================
  Synavera Project: Bundle-Docs
  Module: bundledocs_core::source
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Retrieve bundle metadata and normalise it into a model:
    a single remote document, inline payloads supplied through
    environment variables, or per-build metadata on the CDN.

  Security / Safety Notes:
    Performs read-only HTTPS GET requests only. No credentials
    are transmitted; environment values are never logged.

  Dependencies:
    reqwest for HTTP, tokio for bounded parallel fetches,
    urlencoding for CDN path segments.

  Operational Scope:
    Runs once per invocation, before any rendering starts.

  Revision History:
    2025-02-03 COD  Implemented remote, inline and CDN sources.
  ------------------------------------------------------------
  SSE Principles Observed:
    - No retries; re-runs are the caller's decision
    - Failures isolated per tool with explicit stages
    - Configurable timeouts and parallelism
============================================================*/

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use urlencoding::encode;

use crate::config::{BundleDocsConfig, HttpConfig, SourceKind, ToolConfig};
use crate::error::{BundleDocsError, Result, ToolFailure};
use crate::model::{
    parse_build_metadata, split_document, BundleVersion, MetadataModel, ToolRelease,
};

/// Download URL of a simple tool's bundle.
pub fn bundle_url(base: &str, tool: &str, version: &str, artifact: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        base.trim_end_matches('/'),
        encode(tool),
        encode(version),
        encode(artifact)
    )
}

/// Download URL of one variant's bundle.
pub fn variant_bundle_url(
    base: &str,
    tool: &str,
    variant: &str,
    build: &str,
    artifact: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        base.trim_end_matches('/'),
        encode(tool),
        encode(variant),
        encode(build),
        encode(artifact)
    )
}

fn metadata_url(base: &str, tool: &str, version: &str) -> String {
    bundle_url(base, tool, version, "metadata.json")
}

fn variant_metadata_url(base: &str, tool: &str, variant: &str, build: &str) -> String {
    variant_bundle_url(base, tool, variant, build, "metadata.json")
}

/// Result of a fetch: the model plus everything that did not make it in.
#[derive(Debug, Default)]
pub struct SourceOutcome {
    pub model: MetadataModel,
    pub failures: Vec<ToolFailure>,
    /// Tools not configured for this invocation, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Metadata retrieval strategy.
pub enum MetadataSource {
    Remote(RemoteSource),
    Inline(InlineSource),
    Cdn(CdnSource),
}

impl MetadataSource {
    /// Build the strategy selected in configuration.
    pub fn from_config(config: &BundleDocsConfig, vars: HashMap<String, String>) -> Result<Self> {
        match config.source {
            SourceKind::Remote => {
                let url = config.remote.url.clone().ok_or_else(|| {
                    BundleDocsError::Config("Remote source selected but no URL set".into())
                })?;
                Ok(MetadataSource::Remote(RemoteSource::new(url, &config.http)?))
            }
            SourceKind::Inline => Ok(MetadataSource::Inline(InlineSource::new(vars))),
            SourceKind::Cdn => Ok(MetadataSource::Cdn(CdnSource::new(
                &config.cdn.base_url,
                &config.http,
                vars,
            )?)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MetadataSource::Remote(source) => format!("remote {}", source.url),
            MetadataSource::Inline(_) => "inline environment payloads".to_string(),
            MetadataSource::Cdn(source) => format!("cdn {}", source.base_url),
        }
    }

    /// Fetch metadata for `tools`.
    ///
    /// `Err` means the source as a whole is unusable; per-tool problems are
    /// reported in [`SourceOutcome::failures`].
    pub async fn fetch(&self, tools: &[ToolConfig]) -> Result<SourceOutcome> {
        match self {
            MetadataSource::Remote(source) => source.fetch(tools).await,
            MetadataSource::Inline(source) => source.fetch(tools),
            MetadataSource::Cdn(source) => source.fetch(tools).await,
        }
    }
}

#[derive(Clone)]
struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|err| BundleDocsError::Runtime(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }

    /// Single GET; any transport error or non-2xx status is `SourceUnavailable`.
    async fn get_text(&self, url: &str) -> Result<String> {
        let unavailable = |reason: String| BundleDocsError::SourceUnavailable {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP status {status}")));
        }
        response
            .text()
            .await
            .map_err(|err| unavailable(format!("Failed to read body: {err}")))
    }
}

/// One GET of a complete metadata document.
pub struct RemoteSource {
    url: String,
    http: HttpFetcher,
}

impl RemoteSource {
    pub fn new(url: impl Into<String>, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            http: HttpFetcher::new(http)?,
        })
    }

    async fn fetch(&self, tools: &[ToolConfig]) -> Result<SourceOutcome> {
        let text = self.http.get_text(&self.url).await?;
        let (releases, failures) = split_document(&text, &self.url)?;

        let mut outcome = SourceOutcome::default();
        for (name, err) in failures {
            if tools.iter().any(|tool| tool.name == name) {
                outcome.failures.push(ToolFailure::new(name, err));
            }
        }
        let mut selected = Vec::new();
        for tool in tools {
            match releases.iter().find(|release| release.name() == tool.name) {
                Some(release) => selected.push(release.clone()),
                None if outcome.failures.iter().any(|failure| failure.tool == tool.name) => {}
                None => outcome.failures.push(ToolFailure::new(
                    &tool.name,
                    BundleDocsError::malformed(&self.url, format!("tool `{}` is absent", tool.name)),
                )),
            }
        }
        outcome.model = MetadataModel::new(selected)?;
        Ok(outcome)
    }
}

/// Version strings and payloads supplied through variables; no network.
pub struct InlineSource {
    vars: HashMap<String, String>,
}

impl InlineSource {
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    fn fetch(&self, tools: &[ToolConfig]) -> Result<SourceOutcome> {
        let mut outcome = SourceOutcome::default();
        let mut releases = Vec::new();
        for tool in tools {
            let payload_var = tool.payload_var();
            let Some(payload) = lookup(&self.vars, &payload_var) else {
                outcome
                    .skipped
                    .push((tool.name.clone(), format!("{payload_var} not set")));
                continue;
            };
            match inline_release(tool, payload, lookup(&self.vars, &tool.version_var())) {
                Ok(release) => releases.push(release),
                Err(err) => outcome.failures.push(ToolFailure::new(&tool.name, err)),
            }
        }
        outcome.model = MetadataModel::new(releases)?;
        Ok(outcome)
    }
}

fn inline_release(tool: &ToolConfig, payload: &str, version: Option<&str>) -> Result<ToolRelease> {
    let release = ToolRelease::from_json_str(&tool.name, payload)?;
    Ok(match version {
        Some(version) => release.with_version(BundleVersion::Known(version.to_string())),
        None => release,
    })
}

fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Locally supplied versions, package lists fetched per build from the CDN.
pub struct CdnSource {
    base_url: String,
    http: HttpFetcher,
    vars: HashMap<String, String>,
    max_parallel_requests: usize,
}

enum CdnPlan {
    Simple(String),
    Variants(BTreeMap<String, String>),
}

impl CdnSource {
    pub fn new(base_url: &str, http: &HttpConfig, vars: HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: HttpFetcher::new(http)?,
            vars,
            max_parallel_requests: http.max_parallel_requests.max(1),
        })
    }

    /// Work for one tool, or `None` when its variables are unset.
    fn plan(&self, tool: &ToolConfig) -> Result<Option<CdnPlan>> {
        if !tool.variants {
            let var = tool.version_var();
            return Ok(lookup(&self.vars, &var).map(|version| CdnPlan::Simple(version.to_string())));
        }
        let var = tool.variants_var();
        let Some(raw) = lookup(&self.vars, &var) else {
            return Ok(None);
        };
        let builds: BTreeMap<String, String> =
            serde_json::from_str(raw).map_err(|err| BundleDocsError::malformed(&var, err))?;
        if builds.is_empty() {
            return Ok(None);
        }
        Ok(Some(CdnPlan::Variants(builds)))
    }

    async fn fetch(&self, tools: &[ToolConfig]) -> Result<SourceOutcome> {
        let mut outcome = SourceOutcome::default();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_requests));
        let mut tasks = Vec::new();

        for tool in tools {
            let plan = match self.plan(tool) {
                Ok(Some(plan)) => plan,
                Ok(None) => {
                    let var = if tool.variants {
                        tool.variants_var()
                    } else {
                        tool.version_var()
                    };
                    outcome.skipped.push((tool.name.clone(), format!("{var} not set")));
                    continue;
                }
                Err(err) => {
                    outcome.failures.push(ToolFailure::new(&tool.name, err));
                    continue;
                }
            };

            let http = self.http.clone();
            let base = self.base_url.clone();
            let tool = tool.clone();
            let version = lookup(&self.vars, &tool.version_var()).map(str::to_string);
            let semaphore = semaphore.clone();
            tasks.push(tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_cdn_tool(&http, &base, &tool, plan, version).await,
                    Err(_) => Err(BundleDocsError::Runtime("CDN semaphore closed".into())),
                };
                (tool.name, result)
            }));
        }

        let mut releases = Vec::new();
        for task in tasks {
            let (name, result) = task
                .await
                .map_err(|err| BundleDocsError::Runtime(format!("CDN task failed: {err}")))?;
            match result {
                Ok(release) => releases.push(release),
                Err(err) => outcome.failures.push(ToolFailure::new(name, err)),
            }
        }
        outcome.model = MetadataModel::new(releases)?;
        Ok(outcome)
    }
}

async fn fetch_cdn_tool(
    http: &HttpFetcher,
    base: &str,
    tool: &ToolConfig,
    plan: CdnPlan,
    version: Option<String>,
) -> Result<ToolRelease> {
    match plan {
        CdnPlan::Simple(version) => {
            let url = metadata_url(base, &tool.name, &version);
            let variant = parse_build_metadata(&http.get_text(&url).await?, &url, None)?;
            ToolRelease::simple(
                &tool.name,
                tool.description.clone(),
                BundleVersion::Known(version),
                variant,
            )
        }
        CdnPlan::Variants(builds) => {
            let mut variants = BTreeMap::new();
            for (key, build) in builds {
                let url = variant_metadata_url(base, &tool.name, &key, &build);
                let variant = parse_build_metadata(&http.get_text(&url).await?, &url, Some(build))?;
                variants.insert(key, variant);
            }
            let version = BundleVersion::parse(version, &tool.name)?;
            ToolRelease::new(&tool.name, tool.description.clone(), version, variants)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::model::DEFAULT_VARIANT;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpConfig {
        HttpConfig {
            timeout: 5,
            ..HttpConfig::default()
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn rpmtools() -> ToolConfig {
        let mut tool = ToolConfig::new("rpmtools");
        tool.variants = true;
        tool
    }

    async fn mount_json(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn urls_encode_path_segments() {
        assert_eq!(
            bundle_url("https://cdn/x/", "bintools", "2025 01", "bintools"),
            "https://cdn/x/bintools/2025%2001/bintools"
        );
        assert_eq!(
            variant_metadata_url("https://cdn", "rpmtools", "9.2", "B1"),
            "https://cdn/rpmtools/9.2/B1/metadata.json"
        );
    }

    #[tokio::test]
    async fn remote_document_builds_model() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/metadata.json",
            r#"{"bintools": {"version": "20250125-2110", "packages": [{"name":"kubectl","version": null,"description":"Kubernetes CLI"}]}}"#,
        )
        .await;

        let source = RemoteSource::new(format!("{}/metadata.json", server.uri()), &http()).unwrap();
        let outcome = source.fetch(&[ToolConfig::new("bintools")]).await.unwrap();
        assert!(outcome.failures.is_empty());
        let tool = outcome.model.tool("bintools").unwrap();
        assert_eq!(tool.version().as_known(), Some("20250125-2110"));
    }

    #[tokio::test]
    async fn remote_503_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = RemoteSource::new(format!("{}/metadata.json", server.uri()), &http()).unwrap();
        let err = source.fetch(&[ToolConfig::new("bintools")]).await.unwrap_err();
        assert!(matches!(err, BundleDocsError::SourceUnavailable { ref reason, .. } if reason.contains("503")));
    }

    #[tokio::test]
    async fn remote_unparseable_body_is_malformed() {
        let server = MockServer::start().await;
        mount_json(&server, "/metadata.json", "<html>oops</html>").await;

        let source = RemoteSource::new(format!("{}/metadata.json", server.uri()), &http()).unwrap();
        let err = source.fetch(&[ToolConfig::new("bintools")]).await.unwrap_err();
        assert!(matches!(err, BundleDocsError::MalformedMetadata { .. }));
    }

    #[tokio::test]
    async fn remote_isolates_bad_and_absent_tools() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/metadata.json",
            r#"{"bintools": {"version": "1", "packages": []}, "snaptools": {"version": "1"}, "extra": {"packages": []}}"#,
        )
        .await;

        let source = RemoteSource::new(format!("{}/metadata.json", server.uri()), &http()).unwrap();
        let tools = [
            ToolConfig::new("bintools"),
            ToolConfig::new("snaptools"),
            rpmtools(),
        ];
        let outcome = source.fetch(&tools).await.unwrap();
        assert_eq!(outcome.model.len(), 1);
        assert!(outcome.model.tool("extra").is_none());
        let failed: Vec<&str> = outcome.failures.iter().map(|f| f.tool.as_str()).collect();
        assert_eq!(failed, ["snaptools", "rpmtools"]);
        assert!(outcome.failures.iter().all(|f| f.stage == Stage::Parse));
    }

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}")
    }

    #[tokio::test]
    async fn remote_timeout_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = HttpConfig {
            timeout: 1,
            ..HttpConfig::default()
        };
        let source = RemoteSource::new(format!("{}/metadata.json", server.uri()), &config).unwrap();
        let err = source.fetch(&[ToolConfig::new("bintools")]).await.unwrap_err();
        assert!(matches!(err, BundleDocsError::SourceUnavailable { .. }), "{err:?}");
        assert_eq!(Stage::of(&err), Stage::Fetch);
    }

    #[tokio::test]
    async fn refused_connection_is_source_unavailable() {
        let base = closed_port_url();

        let remote = RemoteSource::new(format!("{base}/metadata.json"), &http()).unwrap();
        let err = remote.fetch(&[ToolConfig::new("bintools")]).await.unwrap_err();
        assert!(matches!(err, BundleDocsError::SourceUnavailable { .. }), "{err:?}");

        let cdn = CdnSource::new(&base, &http(), vars(&[("BINTOOLS_VERSION", "1")])).unwrap();
        let outcome = cdn.fetch(&[ToolConfig::new("bintools")]).await.unwrap();
        assert!(outcome.model.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].stage, Stage::Fetch);
        assert!(matches!(
            outcome.failures[0].error,
            BundleDocsError::SourceUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn cdn_timeout_is_isolated_fetch_failure() {
        let server = MockServer::start().await;
        mount_json(&server, "/bintools/1/metadata.json", r#"{"packages": []}"#).await;
        Mock::given(method("GET"))
            .and(path("/snaptools/2/metadata.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"packages": []}"#)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = HttpConfig {
            timeout: 1,
            ..HttpConfig::default()
        };
        let source = CdnSource::new(
            &server.uri(),
            &config,
            vars(&[("BINTOOLS_VERSION", "1"), ("SNAPTOOLS_VERSION", "2")]),
        )
        .unwrap();
        let outcome = source
            .fetch(&[ToolConfig::new("bintools"), ToolConfig::new("snaptools")])
            .await
            .unwrap();
        assert!(outcome.model.tool("bintools").is_some());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].tool, "snaptools");
        assert_eq!(outcome.failures[0].stage, Stage::Fetch);
    }

    #[tokio::test]
    async fn cdn_fetches_simple_and_variant_tools() {
        let server = MockServer::start().await;
        mount_json(
            &server,
            "/bintools/20250125-2110/metadata.json",
            r#"{"packages": [{"name":"kubectl","version":null,"description":"Kubernetes CLI"}], "sha256": "ab"}"#,
        )
        .await;
        mount_json(
            &server,
            "/rpmtools/9.2/B92/metadata.json",
            r#"{"packages": [{"name":"vim","version":"9.0","description":"Editor"}, {"name":"git","version":"2.43","description":"VCS"}]}"#,
        )
        .await;
        mount_json(&server, "/rpmtools/8.10/B810/metadata.json", r#"{"packages": []}"#).await;

        let source = CdnSource::new(
            &server.uri(),
            &http(),
            vars(&[
                ("BINTOOLS_VERSION", "20250125-2110"),
                ("RPMTOOLS_DATA", r#"{"9.2": "B92", "8.10": "B810"}"#),
            ]),
        )
        .unwrap();
        let outcome = source
            .fetch(&[ToolConfig::new("bintools"), rpmtools()])
            .await
            .unwrap();
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);

        let rpm = outcome.model.tool("rpmtools").unwrap();
        assert_eq!(rpm.version(), &BundleVersion::Unknown);
        assert_eq!(rpm.variant("9.2").unwrap().build(), Some("B92"));
        let names: Vec<&str> = rpm.variant("9.2").unwrap().packages().iter().map(|p| p.name()).collect();
        assert_eq!(names, ["vim", "git"]);
        assert!(rpm.variant("8.10").unwrap().packages().is_empty());
        let bintools = outcome.model.tool("bintools").unwrap();
        assert!(bintools.is_simple());
        assert_eq!(
            bintools.variant(DEFAULT_VARIANT).unwrap().artifact().sha256.as_deref(),
            Some("ab")
        );
    }

    #[tokio::test]
    async fn cdn_failure_is_isolated_to_its_tool() {
        let server = MockServer::start().await;
        mount_json(&server, "/bintools/1/metadata.json", r#"{"packages": []}"#).await;
        Mock::given(method("GET"))
            .and(path("/snaptools/2/metadata.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = CdnSource::new(
            &server.uri(),
            &http(),
            vars(&[("BINTOOLS_VERSION", "1"), ("SNAPTOOLS_VERSION", "2")]),
        )
        .unwrap();
        let outcome = source
            .fetch(&[ToolConfig::new("bintools"), ToolConfig::new("snaptools")])
            .await
            .unwrap();
        assert!(outcome.model.tool("bintools").is_some());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].tool, "snaptools");
        assert_eq!(outcome.failures[0].stage, Stage::Fetch);
    }

    #[tokio::test]
    async fn cdn_skips_tools_without_versions() {
        let source = CdnSource::new("http://127.0.0.1:9", &http(), vars(&[("RPMTOOLS_DATA", "{}")])).unwrap();
        let outcome = source
            .fetch(&[ToolConfig::new("bintools"), rpmtools()])
            .await
            .unwrap();
        assert!(outcome.model.is_empty());
        assert!(outcome.failures.is_empty());
        let skipped: Vec<&str> = outcome.skipped.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(skipped, ["bintools", "rpmtools"]);
    }

    #[tokio::test]
    async fn cdn_rejects_malformed_variant_data() {
        let source = CdnSource::new(
            "http://127.0.0.1:9",
            &http(),
            vars(&[("RPMTOOLS_DATA", "not json")]),
        )
        .unwrap();
        let outcome = source.fetch(&[rpmtools()]).await.unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].stage, Stage::Parse);
    }

    #[test]
    fn inline_payload_with_version_override() {
        let source = InlineSource::new(vars(&[
            (
                "BINTOOLS_PAYLOAD",
                r#"{"packages": [{"name":"kubectl","description":"Kubernetes CLI"}]}"#,
            ),
            ("BINTOOLS_VERSION", "20250125-2110"),
            ("SNAPTOOLS_VERSION", "1"),
            ("RPMTOOLS_PAYLOAD", r#"{"variants": {"9.2": "oops"}}"#),
        ]));
        let outcome = source
            .fetch(&[ToolConfig::new("bintools"), ToolConfig::new("snaptools"), rpmtools()])
            .unwrap();

        let bintools = outcome.model.tool("bintools").unwrap();
        assert_eq!(bintools.version().as_known(), Some("20250125-2110"));
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].0, "snaptools");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].tool, "rpmtools");
    }
}
