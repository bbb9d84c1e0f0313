//! `tether watch` – keep streams connected until Ctrl-C.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tether_core::config::{self, TetherConfig};
use tether_core::{StreamEndpoint, StreamRegistry};
use tokio::task::JoinSet;

use super::{parse_header, parse_stream_arg};

/// Streams from the config file followed by `stream_args`, with `headers` applied to all.
pub(crate) fn collect_targets(
    cfg: &TetherConfig,
    stream_args: &[String],
    headers: &[String],
) -> Result<Vec<(String, StreamEndpoint)>> {
    let headers = headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<Result<Vec<_>>>()?;

    let mut targets = Vec::new();
    for sc in &cfg.streams {
        targets.push((sc.name.clone(), sc.to_endpoint()?));
    }
    for raw in stream_args {
        let (name, url) = parse_stream_arg(raw)?;
        let endpoint =
            StreamEndpoint::new(url).with_context(|| format!("stream `{name}`"))?;
        targets.push((name, endpoint));
    }
    for (name, endpoint) in &mut targets {
        for (k, v) in &headers {
            endpoint
                .set_header(k.as_str(), v.as_str())
                .with_context(|| format!("stream `{name}`"))?;
        }
    }
    Ok(targets)
}

fn print_status(registry: &StreamRegistry) {
    for s in registry.snapshot() {
        let last_id = if s.last_event_id.is_empty() {
            "-"
        } else {
            s.last_event_id.as_str()
        };
        println!(
            "{:<16} {:<13} {:<8} {:<10} {}",
            s.name,
            s.state.as_str(),
            s.attempt_count,
            last_id,
            s.address
        );
    }
}

pub async fn run_watch(
    cfg: &TetherConfig,
    stream_args: &[String],
    headers: &[String],
    status_every: Duration,
) -> Result<()> {
    let targets = collect_targets(cfg, stream_args, headers)?;
    if targets.is_empty() {
        bail!(
            "no streams to watch: add [[streams]] to {} or pass NAME=URL",
            config::config_path()?.display()
        );
    }
    let policy = Arc::new(cfg.retry_policy().context("invalid [retry] section")?);
    let connector = Arc::new(cfg.connector());
    let registry = Arc::new(StreamRegistry::new(policy, connector));

    let mut adds = JoinSet::new();
    for (name, endpoint) in targets {
        let registry = Arc::clone(&registry);
        adds.spawn(async move {
            let res = registry.add_connection(name.clone(), endpoint).await;
            (name, res)
        });
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(status_every);
    ticker.tick().await;
    let mut failed = 0usize;

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("listening for Ctrl-C")?;
                println!("Shutting down.");
                break;
            }
            Some(joined) = adds.join_next(), if !adds.is_empty() => {
                match joined {
                    Ok((name, Ok(_))) => println!("{name}: connected"),
                    Ok((name, Err(err))) => {
                        failed += 1;
                        eprintln!("{name}: {err:#}");
                    }
                    Err(err) => tracing::error!("stream task failed: {}", err),
                }
                if adds.is_empty() && registry.is_empty() {
                    break;
                }
            }
            _ = ticker.tick() => print_status(&registry),
        }
    }

    registry.disconnect_all().await;
    adds.shutdown().await;

    if failed > 0 {
        bail!("{failed} stream(s) could not be connected");
    }
    Ok(())
}
