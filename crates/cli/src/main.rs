use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use roster_api::{bootstrap, InventoryApi, KubeHub, QueryService};
use roster_core::is_eligible;
use roster_kubehub::{Catalog, FetchConfig, DEFAULT_FETCH_CONCURRENCY, DEFAULT_FETCH_TIMEOUT_SECS};
use roster_web::WebConfig;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rosterctl", version, about = "Inventory of namespaced cluster resources")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Listing calls in flight while building the inventory
    #[arg(long, global = true, env = "ROSTER_FETCH_CONCURRENCY", default_value_t = DEFAULT_FETCH_CONCURRENCY)]
    concurrency: usize,

    /// Per-kind listing timeout, seconds
    #[arg(long = "fetch-timeout", global = true, env = "ROSTER_FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    fetch_timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the kind catalog and which kinds would be indexed (no listing)
    Discover,
    /// Build the inventory and print the indexed kinds
    Kinds,
    /// Build the inventory and list the instances of a kind
    Ls {
        /// Plural resource name, e.g. "pods"
        kind: String,
    },
    /// Build the inventory and print one instance without managed fields
    Get {
        kind: String,
        namespace: String,
        name: String,
    },
    /// Build the inventory once, then serve it over HTTP until Ctrl-C
    Serve {
        #[arg(long, env = "ROSTER_LISTEN", default_value = roster_web::DEFAULT_LISTEN)]
        listen: SocketAddr,
        /// Allow cross-origin requests (browser front ends)
        #[arg(long, env = "ROSTER_CORS", action = ArgAction::SetTrue)]
        cors: bool,
    },
}

/// Log filter from `ROSTER_LOG` (default `info`). Logs go to stderr; stdout carries results.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("ROSTER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Prometheus scrape endpoint on `ROSTER_METRICS_ADDR`, when set.
fn init_metrics() {
    let Ok(raw) = std::env::var("ROSTER_METRICS_ADDR") else { return };
    let installed = raw
        .parse::<SocketAddr>()
        .context("ROSTER_METRICS_ADDR must be host:port")
        .and_then(|sock| PrometheusBuilder::new().with_http_listener(sock).install().context("installing exporter"));
    match installed {
        Ok(()) => info!(addr = %raw, "metrics: exporter listening"),
        Err(e) => warn!(error = %format!("{:#}", e), "metrics: exporter disabled"),
    }
}

/// Machine-readable rendering for `-o json` / `-o yaml`.
fn emit<T: Serialize + ?Sized>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml | Output::Human => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

async fn build(cfg: &FetchConfig) -> Result<QueryService> {
    let hub = KubeHub::try_default().await?;
    let (svc, report) = bootstrap(&hub, &hub, cfg).await?;
    if !report.failed.is_empty() {
        warn!(kinds = %report.failed.join(","), "inventory is missing instances for some kinds");
    }
    info!(kinds = report.eligible, objects = report.objects, took_ms = report.took_ms, "inventory ready");
    Ok(svc)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let fetch_cfg = FetchConfig::new(cli.concurrency, cli.fetch_timeout_secs);

    match cli.command {
        Commands::Discover => {
            let hub = KubeHub::try_default().await?;
            let kinds = hub.enumerate_kinds().await?;
            if cli.output == Output::Human {
                for d in kinds {
                    let scope = if d.namespaced { "namespaced" } else { "cluster" };
                    let mark = if is_eligible(&d) { "indexed" } else { "skipped" };
                    println!("{} • {} • {} • {}", d.gvr_key(), d.kind, scope, mark);
                }
            } else {
                emit(cli.output, &kinds)?;
            }
        }
        Commands::Kinds => {
            let svc = build(&fetch_cfg).await?;
            let kinds = svc.list_kinds();
            if cli.output == Output::Human {
                kinds.iter().for_each(|k| println!("{}", k));
            } else {
                emit(cli.output, &kinds)?;
            }
        }
        Commands::Ls { kind } => {
            let svc = build(&fetch_cfg).await?;
            let keys = svc.list_instances(&kind)?;
            if cli.output == Output::Human {
                let now = Utc::now();
                println!("{:<24} {:<40} AGE", "NAMESPACE", "NAME");
                for key in keys {
                    let ts = svc.index().get(&kind, &key.namespace, &key.name).ok().and_then(|o| o.creation_ts);
                    println!("{:<24} {:<40} {}", key.namespace, key.name, render_age(ts, now));
                }
            } else {
                emit(cli.output, &keys)?;
            }
        }
        Commands::Get { kind, namespace, name } => {
            let svc = build(&fetch_cfg).await?;
            match cli.output {
                Output::Human | Output::Yaml => print!("{}", svc.get_instance_detail(&kind, &namespace, &name)?),
                Output::Json => emit(cli.output, &svc.get_instance(&kind, &namespace, &name)?.raw)?,
            }
        }
        Commands::Serve { listen, cors } => {
            let svc = build(&fetch_cfg).await?;
            let api: Arc<dyn InventoryApi> = Arc::new(svc);
            let web_cfg = WebConfig { listen, cors };
            let app = roster_web::router(api, &web_cfg);
            roster_web::serve(app, web_cfg.listen, async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Ctrl-C received; shutting down");
            })
            .await?;
        }
    }

    Ok(())
}

/// kubectl-style AGE column; `-` when the creation time is unknown.
fn render_age(creation_ts: Option<i64>, now: DateTime<Utc>) -> String {
    let Some(created) = creation_ts.filter(|ts| *ts > 0).and_then(|ts| DateTime::from_timestamp(ts, 0)) else {
        return "-".to_string();
    };
    let age = (now - created).max(TimeDelta::zero());
    match (age.num_days(), age.num_hours() % 24, age.num_minutes() % 60) {
        (d, h, _) if d > 0 => format!("{}d{}h", d, h),
        (_, h, m) if h > 0 => format!("{}h{}m", h, m),
        (_, _, m) if m > 0 => format!("{}m", m),
        _ => format!("{}s", age.num_seconds()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64) -> DateTime<Utc> { DateTime::from_timestamp(ts, 0).unwrap() }

    #[test]
    fn age_of_unknown_timestamp_is_dash() {
        assert_eq!(render_age(None, Utc::now()), "-");
        assert_eq!(render_age(Some(0), Utc::now()), "-");
    }

    #[test]
    fn age_picks_the_two_largest_units() {
        let created = 1_700_000_000;
        assert_eq!(render_age(Some(created), at(created + 2 * 86_400 + 3600)), "2d1h");
        assert_eq!(render_age(Some(created), at(created + 3 * 3600 + 5 * 60)), "3h5m");
        assert_eq!(render_age(Some(created), at(created + 90)), "1m");
        assert_eq!(render_age(Some(created), at(created + 7)), "7s");
        // clock skew: created in the future
        assert_eq!(render_age(Some(created), at(created - 30)), "0s");
    }

    #[test]
    fn cli_parses_serve_flags() {
        let cli = Cli::try_parse_from(["rosterctl", "--concurrency", "3", "serve", "--listen", "0.0.0.0:9000", "--cors"]).expect("parse");
        assert_eq!(cli.concurrency, 3);
        match cli.command {
            Commands::Serve { listen, cors } => {
                assert_eq!(listen.port(), 9000);
                assert!(cors);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cli_parses_get() {
        let cli = Cli::try_parse_from(["rosterctl", "-o", "json", "get", "pods", "ns-a", "x"]).expect("parse");
        assert_eq!(cli.output, Output::Json);
        assert!(matches!(cli.command, Commands::Get { ref kind, .. } if kind == "pods"));
    }

    #[test]
    fn cli_parses_yaml_output() {
        let cli = Cli::try_parse_from(["rosterctl", "kinds", "-o", "yaml"]).expect("parse");
        assert_eq!(cli.output, Output::Yaml);
        assert!(matches!(cli.command, Commands::Kinds));
        assert!(Cli::try_parse_from(["rosterctl", "-o", "toml", "kinds"]).is_err());
    }
}
