//! `toolweave init` — write a default config.

use toolweave_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    let conversations_dir = AppConfig::default().storage.resolved_dir();
    if !conversations_dir.exists() {
        std::fs::create_dir_all(&conversations_dir)?;
        println!("Created conversations directory: {}", conversations_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run `toolweave init`.");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config.toml at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Start LM Studio (or edit the provider section for OpenAI / Ollama)");
    println!("  2. Run: toolweave chat");
    Ok(())
}
