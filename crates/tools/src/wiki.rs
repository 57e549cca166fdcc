//! Wikipedia tool — finds the best-matching article and returns its introduction.

use async_trait::async_trait;
use serde::Deserialize;
use toolweave_core::error::ToolError;
use toolweave_core::tool::{Tool, ToolOutput};
use tracing::debug;

use crate::http;

pub struct WikiTool {
    client: reqwest::Client,
}

impl WikiTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WikiTool {
    fn name(&self) -> &str {
        "wiki"
    }

    fn description(&self) -> &str {
        "Search Wikipedia for the most relevant article and return its introduction."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for the Wikipedia article"
                },
                "lang": {
                    "type": "string",
                    "description": "Wikipedia language code (default \"en\")",
                    "default": "en"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = arguments["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let lang = arguments["lang"].as_str().unwrap_or("en");
        if !valid_lang(lang) {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid language code: {lang}"
            )));
        }

        let search_url = format!("https://{lang}.wikipedia.org/w/rest.php/v1/search/title");
        let body = http::get_text(
            self.name(),
            self.client
                .get(&search_url)
                .query(&[("q", query), ("limit", "1")]),
        )
        .await?;

        let key = parse_search(&body).ok_or_else(|| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("No Wikipedia article found for '{query}'"),
        })?;
        debug!(query, key = %key, "Wikipedia article matched");

        let mut summary_url =
            reqwest::Url::parse(&format!("https://{lang}.wikipedia.org/api/rest_v1/page/summary"))
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: self.name().into(),
                    reason: e.to_string(),
                })?;
        summary_url
            .path_segments_mut()
            .map_err(|_| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: "summary URL cannot be a base".into(),
            })?
            .push(&key);

        let body = http::get_text(self.name(), self.client.get(summary_url)).await?;
        let article = parse_summary(&body).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("Unexpected summary response: {e}"),
        })?;

        let display = format!("Wikipedia: {}", article.title);
        Ok(ToolOutput::new(
            serde_json::json!({
                "title": article.title,
                "summary": article.extract,
                "url": article.url,
            }),
            display,
        ))
    }
}

fn valid_lang(lang: &str) -> bool {
    (2..=12).contains(&lang.len()) && lang.chars().all(|c| c.is_ascii_lowercase() || c == '-')
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pages: Vec<SearchPage>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    key: String,
}

fn parse_search(body: &str) -> Option<String> {
    serde_json::from_str::<SearchResponse>(body)
        .ok()?
        .pages
        .into_iter()
        .next()
        .map(|p| p.key)
}

#[derive(Debug, PartialEq)]
struct Article {
    title: String,
    extract: String,
    url: Option<String>,
}

fn parse_summary(body: &str) -> Result<Article, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    Ok(Article {
        title: value["title"].as_str().unwrap_or_default().to_string(),
        extract: value["extract"].as_str().unwrap_or_default().to_string(),
        url: value["content_urls"]["desktop"]["page"]
            .as_str()
            .map(String::from),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> WikiTool {
        WikiTool::new(reqwest::Client::new())
    }

    #[test]
    fn tool_definition() {
        let def = tool().to_definition();
        assert_eq!(def.name, "wiki");
        assert_eq!(def.parameters["required"][0], "query");
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let err = tool().execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = tool()
            .execute(serde_json::json!({"query": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn bad_language_is_invalid() {
        let err = tool()
            .execute(serde_json::json!({"query": "Rust", "lang": "evil.com/x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn parses_search_key() {
        let body = r#"{"pages":[{"id":1,"key":"Rust_(programming_language)","title":"Rust (programming language)"}]}"#;
        assert_eq!(parse_search(body).as_deref(), Some("Rust_(programming_language)"));
        assert!(parse_search(r#"{"pages":[]}"#).is_none());
        assert!(parse_search("garbage").is_none());
    }

    #[test]
    fn parses_summary() {
        let body = r#"{
            "title": "Rust (programming language)",
            "extract": "Rust is a general-purpose programming language.",
            "content_urls": {"desktop": {"page": "https://en.wikipedia.org/wiki/Rust_(programming_language)"}}
        }"#;
        let article = parse_summary(body).unwrap();
        assert_eq!(article.title, "Rust (programming language)");
        assert!(article.extract.starts_with("Rust is"));
        assert!(article.url.unwrap().contains("wikipedia.org"));
    }

    #[test]
    fn language_codes() {
        assert!(valid_lang("en"));
        assert!(valid_lang("zh-yue"));
        assert!(!valid_lang("EN"));
        assert!(!valid_lang("e"));
    }
}
