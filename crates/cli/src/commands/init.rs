//! `promptforge init` — Write a default configuration file.

use promptforge_config::AppConfig;

use super::CliError;

pub async fn run() -> Result<(), CliError> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Wrote default config: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set an API key: export PROMPTFORGE_API_KEY=sk-...");
    println!("  2. Create a topic: promptforge topic new");
    println!("  3. Say hello:      promptforge send --topic <id> \"hello\"");
    Ok(())
}
