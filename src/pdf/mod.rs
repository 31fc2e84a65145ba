//! HTML to PDF rendering.
//!
//! [`ChromePdfRenderer`] drives a headless Chromium found once per process.
//! Rendering is not pooled: every call starts the browser with the page in
//! a temp directory and a fixed timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::error::{CorpdeskError, Result};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Print defaults applied to every document before the configured overrides.
pub const BASE_PRINT_CSS: &str = "@page { size: Letter; margin: 0.6in; } \
html, body { -webkit-print-color-adjust: exact; print-color-adjust: exact; }";

const BROWSER_CANDIDATES: [&str; 6] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "headless_shell",
];

#[derive(Debug, Clone)]
pub struct PdfConfig {
    /// Browser binary; searched for on `PATH` when absent.
    pub browser_path: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Extra CSS injected into every document.
    pub css_overrides: Option<String>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            browser_path: None,
            timeout_secs: 30,
            css_overrides: None,
        }
    }
}

impl PdfConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            browser_path: get_env_with_prefix("PDF_BROWSER_PATH").map(PathBuf::from),
            css_overrides: get_env_with_prefix("PDF_CSS_OVERRIDES"),
            ..Self::default()
        };
        if let Some(timeout) = parse_env_with_prefix("PDF_TIMEOUT_SECONDS") {
            config.timeout_secs = timeout;
        }
        config
    }
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>>;

    /// Whether rendering can be attempted at all.
    async fn is_available(&self) -> bool;

    fn name(&self) -> &'static str;
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Content policy for rendered documents: inline styles and `data:` images only.
pub const DOCUMENT_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; img-src data:";

/// Byte offset just past the opening `<head>` tag, if the document has one.
fn head_open_end(lower: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = lower[from..].find("<head") {
        let start = from + found;
        let after = start + "<head".len();
        match lower[after..].chars().next() {
            Some(c) if c == '>' || c.is_ascii_whitespace() => {
                return lower[after..].find('>').map(|end| after + end + 1);
            }
            _ => from = after,
        }
    }
    None
}

/// Prepend the content policy and a `<style>` block to the document head,
/// creating a head when there is none.
///
/// The policy goes first so nothing in the document loads before it applies.
pub fn inject_css(html: &str, css: &str) -> String {
    let mut block = format!(
        "<meta http-equiv=\"Content-Security-Policy\" content=\"{}\">",
        DOCUMENT_CSP
    );
    if !css.trim().is_empty() {
        block.push_str(&format!("<style>{}</style>", css));
    }
    let lower = html.to_ascii_lowercase();

    let (insert_at, insert) = if let Some(pos) = head_open_end(&lower) {
        (pos, block)
    } else {
        let head = format!("<head>{}</head>", block);
        match lower.find("<html") {
            Some(start) => match lower[start..].find('>') {
                Some(end) => (start + end + 1, head),
                None => (0, head),
            },
            None => (0, head),
        }
    };

    let mut out = String::with_capacity(html.len() + insert.len());
    out.push_str(&html[..insert_at]);
    out.push_str(&insert);
    out.push_str(&html[insert_at..]);
    out
}

fn find_on_path() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .flat_map(|dir| BROWSER_CANDIDATES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

pub struct ChromePdfRenderer {
    config: PdfConfig,
    browser: OnceCell<Option<PathBuf>>,
}

impl ChromePdfRenderer {
    pub fn new(config: PdfConfig) -> Self {
        Self {
            config,
            browser: OnceCell::new(),
        }
    }

    /// Resolve the browser on first use and remember the answer.
    async fn browser(&self) -> Option<&PathBuf> {
        self.browser
            .get_or_init(|| async {
                let found = match &self.config.browser_path {
                    Some(path) if path.is_file() => Some(path.clone()),
                    Some(path) => {
                        tracing::warn!(path = %path.display(), "Configured PDF browser not found");
                        None
                    }
                    None => find_on_path(),
                };
                match &found {
                    Some(path) => tracing::info!(browser = %path.display(), "PDF browser resolved"),
                    None => tracing::warn!("No headless browser available, PDF rendering disabled"),
                }
                found
            })
            .await
            .as_ref()
    }

    fn css(&self) -> String {
        match &self.config.css_overrides {
            Some(extra) => format!("{}\n{}", BASE_PRINT_CSS, extra),
            None => BASE_PRINT_CSS.to_string(),
        }
    }

    async fn run_browser(&self, browser: &Path, input: &Path, output: &Path) -> Result<()> {
        let mut cmd = Command::new(browser);
        cmd.arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg("--blink-settings=scriptEnabled=false")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", input.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            cmd.output(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(timeout_secs = self.config.timeout_secs, "PDF rendering timed out");
            CorpdeskError::service_unavailable("PDF rendering timed out")
        })?
        .map_err(|e| CorpdeskError::internal(format!("Failed to start browser: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(CorpdeskError::internal(format!(
                "Browser exited with {}: {}",
                result.status, tail
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PdfRenderer for ChromePdfRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>> {
        let browser = self
            .browser()
            .await
            .ok_or_else(|| CorpdeskError::service_unavailable("PDF rendering is not available"))?;

        let io_err = |e: std::io::Error| CorpdeskError::internal(format!("PDF temp file error: {}", e));
        let dir = tempfile::tempdir().map_err(io_err)?;
        let input = dir.path().join("document.html");
        let output = dir.path().join("document.pdf");
        tokio::fs::write(&input, inject_css(html, &self.css()))
            .await
            .map_err(io_err)?;

        let started = std::time::Instant::now();
        self.run_browser(browser, &input, &output).await?;

        let bytes = tokio::fs::read(&output).await.map_err(io_err)?;
        if !is_pdf(&bytes) {
            return Err(CorpdeskError::internal("Browser output is not a PDF"));
        }
        tracing::debug!(
            size = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PDF rendered"
        );
        Ok(bytes)
    }

    async fn is_available(&self) -> bool {
        self.browser().await.is_some()
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSP_META: &str = "<meta http-equiv=\"Content-Security-Policy\" \
content=\"default-src 'none'; style-src 'unsafe-inline'; img-src data:\">";

    #[test]
    fn test_inject_at_head_start() {
        let html = "<html><HEAD><title>x</title></HEAD><body></body></html>";
        let out = inject_css(html, "body{color:red}");
        assert_eq!(
            out,
            format!(
                "<html><HEAD>{}<style>body{{color:red}}</style><title>x</title></HEAD>\
                 <body></body></html>",
                CSP_META
            )
        );
    }

    #[test]
    fn test_header_element_is_not_a_head() {
        let html = "<html><header>x</header></html>";
        let out = inject_css(html, "p{}");
        assert!(out.starts_with(&format!("<html><head>{}<style>p{{}}</style></head>", CSP_META)));
    }

    #[test]
    fn test_inject_creates_head() {
        let out = inject_css("<html lang=\"en\"><body>x</body></html>", "p{}");
        assert_eq!(
            out,
            format!(
                "<html lang=\"en\"><head>{}<style>p{{}}</style></head><body>x</body></html>",
                CSP_META
            )
        );

        let bare = inject_css("<p>x</p>", "p{}");
        assert_eq!(bare, format!("<head>{}<style>p{{}}</style></head><p>x</p>", CSP_META));

        // The policy is applied even without extra CSS.
        assert_eq!(
            inject_css("<p>x</p>", "  "),
            format!("<head>{}</head><p>x</p>", CSP_META)
        );
    }

    #[test]
    fn test_pdf_signature() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"<html>"));
    }

    #[tokio::test]
    async fn test_missing_browser_is_unavailable() {
        let renderer = ChromePdfRenderer::new(PdfConfig {
            browser_path: Some(PathBuf::from("/nonexistent/chromium")),
            ..PdfConfig::default()
        });
        assert!(!renderer.is_available().await);
        let err = renderer.render("<html></html>").await.unwrap_err();
        assert!(matches!(err, CorpdeskError::ServiceUnavailable(_)));
    }
}
