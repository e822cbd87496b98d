//! Content loaders for PDFs and web pages.
//!
//! Both loaders are adapters over external collaborators. PDF parsing runs a
//! converter command (`pdftotext` by default) in a child process; web loading
//! fetches static HTML and, when a JavaScript renderer is configured, falls
//! back to it for pages that look like single-page apps or come back nearly
//! empty.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("converter `{command}` failed for {path}: {detail}")]
    Converter {
        command: String,
        path: String,
        detail: String,
    },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("JS rendering failed for {url}: {detail}")]
    Render { url: String, detail: String },
}

/// Turns a PDF file into markdown-ish text.
#[async_trait]
pub trait PdfParser: Send + Sync {
    async fn to_markdown(&self, path: &str) -> Result<String, LoaderError>;
}

/// [`PdfParser`] backed by an external converter command invoked as
/// `{command} {path} -` with the text on stdout. Markdown and plain-text files
/// skip the converter and are read as-is.
pub struct CommandPdfParser {
    command: String,
}

impl CommandPdfParser {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl PdfParser for CommandPdfParser {
    async fn to_markdown(&self, path: &str) -> Result<String, LoaderError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(extension.as_str(), "md" | "markdown" | "txt") {
            return tokio::fs::read_to_string(path).await.map_err(|source| {
                LoaderError::Io {
                    path: path.to_string(),
                    source,
                }
            });
        }

        let output = Command::new(&self.command)
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|source| LoaderError::Io {
                path: path.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(LoaderError::Converter {
                command: self.command.clone(),
                path: path.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// External JavaScript renderer for SPA-ish pages. Out of scope for this
/// crate; deployments plug in a headless-browser sidecar.
#[async_trait]
pub trait JsRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, LoaderError>;
}

static SPA_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"<div[^>]+id=["']root["']"#,
        r#"<div[^>]+id=["']__next["']"#,
        r#"<div[^>]+id=["']app["']"#,
        r"data-reactroot",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid SPA marker regex"))
    .collect()
});

/// Heuristic: does this HTML need JavaScript rendering to produce content?
pub fn looks_like_spa(html: &str) -> bool {
    let lowered = html.to_ascii_lowercase();
    let marker_hit = SPA_MARKERS.iter().any(|re| re.is_match(&lowered));
    let many_scripts = lowered.matches("<script").count() >= 8;
    marker_hit || many_scripts
}

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")
        .expect("valid block regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid tag regex"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank-run regex"));

/// Strips markup down to readable text: script/style blocks go first, then
/// tags, then entity and whitespace cleanup.
pub fn html_to_text(html: &str) -> String {
    let without_blocks = SCRIPT_BLOCK.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_blocks, "\n");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let lines: Vec<&str> = decoded.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

/// Loads web pages, preferring the static fetch and escalating to the JS
/// renderer only when the static result is thin or SPA-shaped.
pub struct WebLoader {
    client: Client,
    min_text_len: usize,
    js_renderer: Option<Arc<dyn JsRenderer>>,
}

impl WebLoader {
    pub fn new(client: Client, min_text_len: usize) -> Self {
        Self {
            client,
            min_text_len,
            js_renderer: None,
        }
    }

    pub fn with_js_renderer(mut self, renderer: Arc<dyn JsRenderer>) -> Self {
        self.js_renderer = Some(renderer);
        self
    }

    async fn fetch_static(&self, url: &str) -> Result<String, LoaderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|source| LoaderError::Fetch {
                url: url.to_string(),
                source,
            })?;
        response.text().await.map_err(|source| LoaderError::Fetch {
            url: url.to_string(),
            source,
        })
    }

    /// Fetches a page and returns its extracted text.
    pub async fn load(&self, url: &str) -> Result<String, LoaderError> {
        let html = self.fetch_static(url).await?;
        let baseline = html_to_text(&html);

        let need_js = baseline.chars().count() < self.min_text_len || looks_like_spa(&html);
        if need_js {
            if let Some(renderer) = &self.js_renderer {
                match renderer.render(url).await {
                    Ok(rendered) => {
                        let rendered_text = html_to_text(&rendered);
                        if rendered_text.chars().count() > baseline.chars().count() {
                            return Ok(rendered_text);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(url, %error, "JS rendering failed, keeping static text");
                    }
                }
            }
        }
        Ok(baseline)
    }
}
