//! Effective configuration command.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Print the configuration actually in effect (file values over defaults).
pub fn show_config(state: &AppState, json: bool) -> Result<()> {
    if json {
        let config = serde_json::json!({
            "data_dir": state.data_dir.display().to_string(),
            "config": state.config,
        });
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Cutout v{}  {}",
        style("✂").bold(),
        env!("CARGO_PKG_VERSION"),
        style(format!("data dir: {}", state.data_dir.display())).dim()
    );
    println!();
    for line in toml::to_string_pretty(&state.config)?.lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}
