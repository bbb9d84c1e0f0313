//! `tether config` – print the config file path.

use anyhow::Result;
use tether_core::config;

pub fn run_config() -> Result<()> {
    println!("{}", config::config_path()?.display());
    Ok(())
}
