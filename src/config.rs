//! Configuration loading
//!
//! Loads the multi-bot YAML configuration and validates it into typed
//! per-chain specs. One bot definition per monitored chain; addresses
//! are parsed and checked once at startup.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default aggregator flush interval for `monitor`, in seconds.
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 3600;

/// Default bounded fan-out for range scans.
const DEFAULT_CONCURRENCY: usize = 4;

/// Largest accepted `token_decimals` value.
const MAX_TOKEN_DECIMALS: u8 = 36;

/// Raw YAML configuration file.
///
/// ```yaml
/// report_interval_secs: 900
/// bots:
///   arb-weth:
///     rpc_url: https://arb1.arbitrum.io/rpc
///     ws_url: wss://arb1.arbitrum.io/feed
///     watched_address: "0x0000000000deadbeef00112233445566778899aa"
///     token_contract: "0x82af49447d8a07e3bd95bd0d56f35241523fbab1"
///     token_decimals: 18
/// ```
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    /// How often `monitor` flushes the aggregator, in seconds.
    #[serde(default)]
    pub report_interval_secs: Option<u64>,

    /// One entry per monitored chain, keyed by bot name.
    pub bots: BTreeMap<String, RawBot>,
}

#[derive(Debug, Deserialize)]
pub struct RawBot {
    pub rpc_url: String,
    pub ws_url: String,
    pub watched_address: String,
    pub token_contract: String,
    pub token_decimals: u8,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub report_interval_secs: u64,
    pub chains: Vec<ChainSpec>,
}

/// Validated per-chain specification, constructed once at startup.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    /// Bot name from the config file, used as the chain label everywhere.
    pub name: String,
    /// HTTP JSON-RPC endpoint.
    pub rpc_url: String,
    /// WebSocket endpoint for newHeads subscriptions.
    pub ws_url: String,
    /// Address whose profitability is tracked.
    pub watched_address: Address,
    /// ERC20 contract whose Transfer events are attributed.
    pub token_contract: Address,
    /// Token decimals, used for display normalization only.
    pub token_decimals: u8,
    /// Bounded fan-out for range scans.
    pub concurrency: usize,
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let raw: RawConfig =
            serde_yaml::from_str(&contents).context("Failed to parse config YAML")?;

        if raw.bots.is_empty() {
            anyhow::bail!("Config defines no bots");
        }

        let mut chains = Vec::with_capacity(raw.bots.len());
        for (name, bot) in raw.bots {
            let watched_address = parse_address(&bot.watched_address)
                .with_context(|| format!("Bot {}: invalid watched_address", name))?;
            let token_contract = parse_address(&bot.token_contract)
                .with_context(|| format!("Bot {}: invalid token_contract", name))?;

            if !bot.rpc_url.starts_with("http") {
                anyhow::bail!("Bot {}: rpc_url must be an http(s) endpoint", name);
            }
            if !bot.ws_url.starts_with("ws") {
                anyhow::bail!("Bot {}: ws_url must be a ws(s) endpoint", name);
            }

            let concurrency = bot.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
            if concurrency == 0 {
                anyhow::bail!("Bot {}: concurrency must be at least 1", name);
            }

            // No real token goes above 18; 36 leaves headroom without
            // letting display math overflow.
            if bot.token_decimals > MAX_TOKEN_DECIMALS {
                anyhow::bail!(
                    "Bot {}: token_decimals {} is out of range (max {})",
                    name,
                    bot.token_decimals,
                    MAX_TOKEN_DECIMALS
                );
            }

            chains.push(ChainSpec {
                name,
                rpc_url: bot.rpc_url,
                ws_url: bot.ws_url,
                watched_address,
                token_contract,
                token_decimals: bot.token_decimals,
                concurrency,
            });
        }

        Ok(Config {
            report_interval_secs: raw
                .report_interval_secs
                .unwrap_or(DEFAULT_REPORT_INTERVAL_SECS),
            chains,
        })
    }

    /// Select a single chain by bot name, or all chains when `name` is None.
    pub fn select(&self, name: Option<&str>) -> Result<Vec<ChainSpec>> {
        match name {
            None => Ok(self.chains.clone()),
            Some(n) => {
                let found: Vec<ChainSpec> = self
                    .chains
                    .iter()
                    .filter(|c| c.name == n)
                    .cloned()
                    .collect();
                if found.is_empty() {
                    anyhow::bail!("No bot named {:?} in config", n);
                }
                Ok(found)
            }
        }
    }
}

/// Pad an odd-length hex string with a leading zero.
fn pad_hex_string(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!(
            "Address must be 20 bytes (40 hex chars), got {} bytes",
            bytes.len()
        );
    }

    Ok(Address::from_slice(&bytes))
}
