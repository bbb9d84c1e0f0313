//! `tether status` – effective retry policy and configured streams, as JSON lines.

use anyhow::{Context, Result};
use serde_json::json;
use tether_core::config::TetherConfig;

pub fn run_status(cfg: &TetherConfig) -> Result<()> {
    // Validate before printing so a broken [retry] section is reported here.
    cfg.retry_policy().context("invalid [retry] section")?;
    let retry = cfg.retry.clone().unwrap_or_default();
    println!(
        "{}",
        json!({
            "connect_timeout_secs": cfg.connect_timeout_secs,
            "retry": retry,
        })
    );
    if cfg.streams.is_empty() {
        eprintln!("No streams configured.");
    }
    for stream in &cfg.streams {
        println!("{}", serde_json::to_string(stream)?);
    }
    Ok(())
}
