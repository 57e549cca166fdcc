use std::time::Duration;
use toolweave_core::error::ToolError;

const USER_AGENT: &str = concat!("toolweave/", env!("CARGO_PKG_VERSION"));

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// GET a URL and return the body, mapping transport and status failures.
pub(crate) async fn get_text(
    tool_name: &str,
    request: reqwest::RequestBuilder,
) -> Result<String, ToolError> {
    let response = request.send().await.map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: format!("HTTP {status}"),
        });
    }

    response.text().await.map_err(|e| ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason: e.to_string(),
    })
}

/// Require an http(s) URL argument.
pub(crate) fn require_url<'a>(arguments: &'a serde_json::Value) -> Result<&'a str, ToolError> {
    let url = arguments["url"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ToolError::InvalidArguments(
            "URL must start with http:// or https://".into(),
        ));
    }
    Ok(url)
}
