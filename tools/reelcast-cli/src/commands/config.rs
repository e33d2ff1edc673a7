//! Show or write the configuration.

use reelcast_common::config::{config_file_path, AppConfig};

pub fn run(config: &AppConfig, write: bool, path_only: bool) -> anyhow::Result<()> {
    if path_only {
        println!("{}", config_file_path().display());
        return Ok(());
    }

    if write {
        let path = config.save()?;
        println!("Configuration written to: {}", path.display());
        return Ok(());
    }

    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
