//! CLI command handlers. Each command is in its own file.

mod config;
mod probe;
mod status;
mod watch;

pub use config::run_config;
pub use probe::run_probe;
pub use status::run_status;
pub use watch::run_watch;

use anyhow::{bail, Context, Result};

/// `NAME:VALUE` -> (name, value), both trimmed.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header `{raw}` must look like NAME:VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header `{raw}` has an empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// `NAME=URL` -> (name, url). The first `=` splits, so URLs may contain more.
pub(crate) fn parse_stream_arg(raw: &str) -> Result<(String, String)> {
    let (name, url) = raw
        .split_once('=')
        .with_context(|| format!("stream `{raw}` must look like NAME=URL"))?;
    let (name, url) = (name.trim(), url.trim());
    if name.is_empty() || url.is_empty() {
        bail!("stream `{raw}` needs both a name and a URL");
    }
    Ok((name.to_string(), url.to_string()))
}
