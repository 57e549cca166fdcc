//! Web page tool — fetches a URL and returns its readable text.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use toolweave_core::error::ToolError;
use toolweave_core::tool::{Tool, ToolOutput};

use crate::http;

const DEFAULT_MAX_CHARS: usize = 8_000;
const HARD_MAX_CHARS: usize = 40_000;

static INVISIBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>|<head\b.*?</head>|<svg\b.*?</svg>|<!--.*?-->",
    )
    .expect("valid regex")
});
static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|h[1-6]|tr|section|article|header|footer|ul|ol|table|blockquote|pre)\b[^>]*>")
        .expect("valid regex")
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

pub struct WebUrlTool {
    client: reqwest::Client,
}

impl WebUrlTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WebUrlTool {
    fn name(&self) -> &str {
        "web_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content. Use when the user gives a URL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL of the page to read"
                },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters of text to return (default 8000)",
                    "default": DEFAULT_MAX_CHARS
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let url = http::require_url(&arguments)?;
        let max_chars = arguments["max_chars"]
            .as_u64()
            .map(|n| (n as usize).clamp(200, HARD_MAX_CHARS))
            .unwrap_or(DEFAULT_MAX_CHARS);

        let body = http::get_text(self.name(), self.client.get(url)).await?;

        let (title, text) = if looks_like_html(&body) {
            (page_title(&body), html_to_text(&body))
        } else {
            (None, body)
        };
        let (content, truncated) = truncate_chars(&text, max_chars);

        let display = format!(
            "Read {} ({} chars{})",
            title.as_deref().unwrap_or(url),
            content.chars().count(),
            if truncated { ", truncated" } else { "" }
        );
        Ok(ToolOutput::new(
            serde_json::json!({
                "url": url,
                "title": title,
                "content": content,
                "truncated": truncated,
            }),
            display,
        ))
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.chars().take(2048).collect::<String>().to_lowercase();
    ["<!doctype html", "<html", "<body", "<div", "<p>", "<p "]
        .iter()
        .any(|marker| head.contains(marker))
}

fn page_title(html: &str) -> Option<String> {
    TITLE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

/// Reduce an HTML document to its visible text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let text = INVISIBLE.replace_all(html, " ");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);

    let mut out = String::new();
    for line in text.lines() {
        let line = SPACES.replace_all(line, " ");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
