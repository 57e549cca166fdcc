//! YouTube tool — title and channel of a video via the public oEmbed endpoint.

use async_trait::async_trait;
use reqwest::Url;
use toolweave_core::error::ToolError;
use toolweave_core::tool::{Tool, ToolOutput};

use crate::http;

const OEMBED_URL: &str = "https://www.youtube.com/oembed";

pub struct YoutubeInfoTool {
    client: reqwest::Client,
}

impl YoutubeInfoTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for YoutubeInfoTool {
    fn name(&self) -> &str {
        "yt_url"
    }

    fn description(&self) -> &str {
        "Get information about a YouTube video (title, channel, thumbnail) from its URL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL of the YouTube video"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let url = http::require_url(&arguments)?;
        let video_id = video_id(url).ok_or_else(|| {
            ToolError::InvalidArguments(format!("Not a YouTube video URL: {url}"))
        })?;
        let canonical = format!("https://www.youtube.com/watch?v={video_id}");

        let body = http::get_text(
            self.name(),
            self.client
                .get(OEMBED_URL)
                .query(&[("url", canonical.as_str()), ("format", "json")]),
        )
        .await?;

        let info: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Unexpected oEmbed response: {e}"),
            })?;

        let title = info["title"].as_str().unwrap_or_default().to_string();
        let channel = info["author_name"].as_str().unwrap_or_default().to_string();
        let display = format!("YouTube: {title} ({channel})");

        Ok(ToolOutput::new(
            serde_json::json!({
                "video_id": video_id,
                "url": canonical,
                "title": title,
                "channel": channel,
                "thumbnail": info["thumbnail_url"],
            }),
            display,
        ))
    }
}

/// Extract the 11-character video ID from the common YouTube URL shapes.
fn video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(String::from),
        "youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("shorts" | "embed" | "live") => segments.next().map(String::from),
                _ => None,
            }
        }
        _ => None,
    }?;

    let valid = candidate.len() == 11
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(candidate)
}
