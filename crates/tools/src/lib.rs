//! Built-in tool implementations for toolweave.
//!
//! Each tool reaches a public HTTP endpoint and returns a compact JSON
//! payload the model can quote from:
//! - `wiki`: Wikipedia article introductions
//! - `web_url`: readable text of a web page
//! - `yt_url`: title and channel of a YouTube video

mod http;
pub mod web_url;
pub mod wiki;
pub mod yt_url;

use std::sync::Arc;
use toolweave_core::tool::ToolRegistry;

pub use web_url::WebUrlTool;
pub use wiki::WikiTool;
pub use yt_url::YoutubeInfoTool;

/// Create a registry with all built-in tools sharing one HTTP client.
pub fn default_registry() -> ToolRegistry {
    let client = http::client();
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WikiTool::new(client.clone())));
    registry.register(Arc::new(WebUrlTool::new(client.clone())));
    registry.register(Arc::new(YoutubeInfoTool::new(client)));
    registry
}
