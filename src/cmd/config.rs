//! Configuration view and validation commands: `cardshift config`.

use std::path::Path;

use anyhow::Result;
use console::style;

use cardshift::config::CardshiftConfig;

use super::super::ConfigCommands;

fn print_config(config: &CardshiftConfig) {
    println!("[server]");
    println!("  base_url = \"{}\"", config.server.base_url);
    println!("  project_id = {}", config.server.project_id);
    println!();
    println!("[sync]");
    println!("  debounce_ms = {}", config.sync.debounce_ms);
    println!();
    println!("[highlight]");
    println!("  enabled = {}", config.highlight.enabled);
    if let Some(color) = &config.highlight.same_column_color {
        println!("  same_column_color = \"{}\"", color);
    }
    if let Some(color) = &config.highlight.cross_column_color {
        println!("  cross_column_color = \"{}\"", color);
    }
    println!();
}

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", style("Cardshift Configuration").bold());
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No cardshift.toml found at {}", config_path.display());
                println!("Run 'cardshift config init' to create one.");
            }
            println!();

            println!("Effective values (with env overrides):");
            println!();
            let config = CardshiftConfig::load_or_default(config_path)?;
            print_config(&config);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No cardshift.toml found. Using defaults (valid).");
                return Ok(());
            }

            let config = CardshiftConfig::load(config_path)?;
            let warnings = config.validate();

            if warnings.is_empty() {
                println!("{}", style("Configuration is valid.").green());
            } else {
                println!("{}", style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("cardshift.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            CardshiftConfig::default().save(config_path)?;

            println!("Created cardshift.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] base_url, project_id");
            println!("  - [sync] debounce_ms");
            println!("  - [highlight] enabled, same_column_color, cross_column_color");
            println!();
        }
    }

    Ok(())
}
