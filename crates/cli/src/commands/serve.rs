//! `toolweave serve` — start the HTTP gateway.

use super::load_config;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("toolweave gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.default_provider, config.default_model);

    toolweave_gateway::start(config).await
}
