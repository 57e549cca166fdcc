pub mod chat;
pub mod conversations;
pub mod init;
pub mod serve;

use std::sync::Arc;
use toolweave_config::AppConfig;
use toolweave_engine::ChatService;

pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Wire provider, tools and store into a chat service.
pub fn build_service(config: &AppConfig) -> Result<ChatService, Box<dyn std::error::Error>> {
    let router = toolweave_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;
    let tools = Arc::new(toolweave_tools::default_registry());
    let store = toolweave_store::build_from_config(&config.storage);
    Ok(ChatService::from_config(config, provider, tools, store))
}
