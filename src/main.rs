//! mevwatch binary
//!
//! Tracks per-block P&L of MEV bot addresses across chains, either over a
//! historical block range (`analyze`) or by following live newHeads
//! streams (`monitor`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mevwatch::aggregator::{Aggregator, ChainEvent};
use mevwatch::config::{ChainSpec, Config};
use mevwatch::processor::BlockProcessor;
use mevwatch::retry::BackoffPolicy;
use mevwatch::rpc::ChainClient;
use mevwatch::scanner::RangeScanner;
use mevwatch::subscriber::LiveSubscriber;
use mevwatch::watermark::Watermark;
use mevwatch::ws::WsConnector;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Multichain MEV bot P&L tracker
#[derive(Parser)]
#[command(name = "mevwatch")]
#[command(about = "Track per-block P&L of MEV bot addresses across chains")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a historical block range and report totals
    Analyze {
        /// Restrict to one bot by name (default: all bots)
        #[arg(short, long)]
        bot: Option<String>,

        /// First block of the range
        #[arg(long)]
        from: u64,

        /// Last block of the range (default: current chain head)
        #[arg(long)]
        to: Option<u64>,
    },
    /// Follow live heads and report totals periodically
    Monitor {
        /// Restrict to one bot by name (default: all bots)
        #[arg(short, long)]
        bot: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    match args.command {
        Command::Analyze { bot, from, to } => {
            let chains = config.select(bot.as_deref())?;
            announce(&chains);
            analyze(chains, from, to).await
        }
        Command::Monitor { bot } => {
            let chains = config.select(bot.as_deref())?;
            announce(&chains);
            monitor(chains, config.report_interval_secs).await
        }
    }
}

fn announce(chains: &[ChainSpec]) {
    for spec in chains {
        info!(
            bot = %spec.name,
            address = %spec.watched_address,
            token = %spec.token_contract,
            "tracking bot"
        );
    }
}

fn decimals_by_chain(chains: &[ChainSpec]) -> BTreeMap<String, u8> {
    chains
        .iter()
        .map(|c| (c.name.clone(), c.token_decimals))
        .collect()
}

/// Scan `[from, to]` on every selected chain concurrently, then print the
/// final totals. Fails if any chain cannot complete its range.
async fn analyze(chains: Vec<ChainSpec>, from: u64, to: Option<u64>) -> Result<()> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<ChainEvent>(256);
    let aggregation = spawn_aggregator(decimals_by_chain(&chains), rx, None);

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    for spec in chains {
        let out = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let client = ChainClient::new(spec.rpc_url.clone());
            let end = match to {
                Some(end) => end,
                None => client
                    .latest_block()
                    .await
                    .with_context(|| format!("chain {}: failed to resolve chain head", spec.name))?,
            };
            if from > end {
                anyhow::bail!(
                    "chain {}: range start {} is beyond end {}",
                    spec.name,
                    from,
                    end
                );
            }

            let watermark = Arc::new(Watermark::new(spec.name.clone()));
            if from > 0 {
                watermark.seed(from - 1);
            }
            let processor = BlockProcessor::new(
                Arc::new(client),
                spec.watched_address,
                spec.token_contract,
            );
            let scanner = RangeScanner::new(
                spec.name.clone(),
                processor,
                watermark,
                out,
                spec.concurrency,
                BackoffPolicy::default(),
                cancel,
            );
            scanner.scan(from, end).await
        });
    }
    drop(tx);

    let outcome = drive_chains(&mut tasks, &cancel).await;

    // All senders are gone; the aggregator drains and reports.
    let final_report = aggregation.await.context("aggregator task panicked")?;
    outcome?;
    final_report
}

/// Follow live heads on every selected chain, flushing window totals every
/// `report_interval_secs`. Runs until Ctrl+C or a chain fails fatally.
async fn monitor(chains: Vec<ChainSpec>, report_interval_secs: u64) -> Result<()> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<ChainEvent>(256);
    let aggregation = spawn_aggregator(
        decimals_by_chain(&chains),
        rx,
        Some(Duration::from_secs(report_interval_secs)),
    );

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    for spec in chains {
        let out = tx.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let client = ChainClient::new(spec.rpc_url.clone());
            let watermark = Arc::new(Watermark::new(spec.name.clone()));
            let processor = BlockProcessor::new(
                Arc::new(client),
                spec.watched_address,
                spec.token_contract,
            );
            let scanner = RangeScanner::new(
                spec.name.clone(),
                processor,
                Arc::clone(&watermark),
                out,
                spec.concurrency,
                BackoffPolicy::default(),
                cancel.clone(),
            );
            let subscriber = LiveSubscriber::new(
                spec.name.clone(),
                WsConnector::new(spec.ws_url.clone()),
                scanner,
                watermark,
                BackoffPolicy::default(),
                cancel,
            );
            subscriber.run().await
        });
    }
    drop(tx);

    let drive = drive_chains(&mut tasks, &cancel);
    tokio::pin!(drive);
    let outcome = tokio::select! {
        outcome = &mut drive => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            cancel.cancel();
            drive.await
        }
    };

    let final_report = aggregation.await.context("aggregator task panicked")?;
    outcome?;
    final_report
}

/// Wait for all chain tasks. The first fatal error cancels the rest, so a
/// stalled chain is a loud failure instead of a silent partial run.
async fn drive_chains(tasks: &mut JoinSet<Result<()>>, cancel: &CancellationToken) -> Result<()> {
    let mut outcome = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let result = joined.context("chain task panicked")?;
        if let Err(e) = result {
            error!("chain failed: {:#}", e);
            cancel.cancel();
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
    }
    outcome
}

/// Fold incoming results until every sender is dropped, flushing on the
/// interval when given one, and always reporting the final window.
fn spawn_aggregator(
    decimals: BTreeMap<String, u8>,
    mut rx: mpsc::Receiver<ChainEvent>,
    interval: Option<Duration>,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let mut aggregator = Aggregator::new(decimals);
        let mut ticker = interval.map(tokio::time::interval);
        if let Some(t) = ticker.as_mut() {
            t.tick().await; // first tick fires immediately
        }

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => aggregator.ingest(&event),
                    None => break,
                },
                _ = tick(&mut ticker) => {
                    let snapshot = aggregator.flush();
                    if snapshot.is_quiet() {
                        info!("no relevant activity this window");
                    }
                    aggregator.report(&snapshot);
                }
            }
        }

        let snapshot = aggregator.flush();
        aggregator.report(&snapshot);
        Ok(())
    })
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
