use color_eyre::eyre::Result;

use crate::config::{config_path, NodeConfig};

pub fn run(path: bool, reset: bool, edit: bool) -> Result<()> {
    let config_file = config_path();

    if path {
        println!("{}", config_file.display());
        return Ok(());
    }

    if reset {
        NodeConfig::default().save()?;
        println!("Config reset to defaults at: {}", config_file.display());
        return Ok(());
    }

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());

        if !config_file.exists() {
            NodeConfig::default().save()?;
        }

        std::process::Command::new(editor)
            .arg(&config_file)
            .status()?;

        if let Err(e) = NodeConfig::try_load().and_then(|c| c.validate()) {
            eprintln!("Warning: config is not valid: {}", e);
        }
        return Ok(());
    }

    let config = NodeConfig::try_load()?;
    config.validate()?;
    println!("Config file: {}", config_file.display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
