//! `tether probe` – one connection attempt, no retries.

use anyhow::{bail, Result};
use std::sync::Arc;
use tether_core::attempt::ConnectionAttempt;
use tether_core::config::TetherConfig;
use tether_core::StreamEndpoint;
use tokio_util::sync::CancellationToken;

use super::parse_header;

pub async fn run_probe(
    cfg: &TetherConfig,
    url: &str,
    headers: &[String],
    last_event_id: Option<&str>,
) -> Result<()> {
    let mut endpoint = StreamEndpoint::new(url)?;
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        endpoint.set_header(name, value)?;
    }
    if let Some(id) = last_event_id {
        endpoint.set_last_event_id(id);
    }
    let policy = cfg.retry_policy()?;

    let attempt = ConnectionAttempt::new(Arc::new(cfg.connector()));
    match attempt
        .connect(&mut endpoint, &CancellationToken::new())
        .await
    {
        Ok(head) => {
            println!(
                "ok: status {} content-type {}",
                head.status,
                head.content_type.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Err(err) => {
            let verdict = if policy.is_retryable(&err) {
                "retryable"
            } else {
                "fatal"
            };
            println!("failed [{}, {}]: {}", err.tag(), verdict, err);
            bail!("probe of {} failed", endpoint.address())
        }
    }
}
