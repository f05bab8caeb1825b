//! Configuration self-test (`--test` / `-t`).
//!
//! Validates the document structure, probes every RPC URL for its chain id,
//! flags chains whose URLs disagree with each other or with the configured
//! id, fills in missing chain ids (unless `--dry-run`), and cross-checks
//! configured token decimals against the contracts. Output is human text or
//! a machine-readable JSON report.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::config::{self, Config};
use crate::infrastructure::ethereum as eth;
use crate::infrastructure::{EvmDataSource, PriceOracle};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Serialize)]
pub struct RpcResult {
    pub url: String,
    /// `"ok"` or `"error"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct TokenResult {
    pub symbol: String,
    pub address: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_decimals: Option<u8>,
    pub decimals_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ChainResult {
    pub name: String,
    pub symbol: String,
    pub config_chain_id: u64,
    pub rpcs: Vec<RpcResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<TokenResult>,
    pub inconsistent: bool,
    pub chain_id_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_chain_id: Option<u64>,
}

#[derive(Debug, Default, Serialize)]
pub struct TestReport {
    pub config_path: String,
    pub valid_structure: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub structure_errors: Vec<String>,
    pub address_count: usize,
    pub chain_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<ChainResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inconsistent_chains: Vec<String>,
    pub config_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
    pub dry_run: bool,
}

/// Run the self-test against a loaded configuration. Returns the process
/// exit code.
pub async fn run(config_path: &Path, mut cfg: Config, json_output: bool, dry_run: bool) -> i32 {
    let mut report = TestReport {
        config_path: config_path.display().to_string(),
        valid_structure: true,
        dry_run,
        ..TestReport::default()
    };

    if !json_output {
        println!("Testing configuration at: {}", config_path.display());
    }

    if cfg.chains.is_empty() {
        report.valid_structure = false;
        report
            .structure_errors
            .push("no chains found in configuration".to_string());
        emit(&report, json_output);
        return 1;
    }

    let mut seen_names = std::collections::HashSet::new();
    for (i, chain) in cfg.chains.iter().enumerate() {
        if chain.name.trim().is_empty() {
            report
                .structure_errors
                .push(format!("chain at index {i} has no name"));
            report.valid_structure = false;
        }
        if chain.rpc_urls.is_empty() {
            report
                .structure_errors
                .push(format!("chain '{}' has no RPC URLs", chain.name));
            report.valid_structure = false;
        }
        if !seen_names.insert(chain.name.clone()) {
            report
                .structure_errors
                .push(format!("duplicate chain name '{}'", chain.name));
            report.valid_structure = false;
        }
    }
    if !report.valid_structure {
        if !json_output {
            for err in &report.structure_errors {
                println!("Error: {err}");
            }
        }
        emit(&report, json_output);
        return 1;
    }

    report.address_count = cfg.addresses.len();
    report.chain_count = cfg.chains.len();
    if !json_output {
        println!(
            "Found {} addresses and {} chains.",
            report.address_count, report.chain_count
        );
    }

    let source = EvmDataSource::new(PriceOracle::default());
    let mut config_updated = false;

    for chain in &mut cfg.chains {
        let mut result = ChainResult {
            name: chain.name.clone(),
            symbol: chain.symbol.clone(),
            config_chain_id: chain.chain_id,
            ..ChainResult::default()
        };
        if !json_output {
            println!("Testing chain: {} ({})", chain.name, chain.symbol);
        }

        let mut observed: Option<u64> = None;
        for url in &chain.rpc_urls {
            let mut rpc = RpcResult {
                url: url.clone(),
                ..RpcResult::default()
            };
            if !json_output {
                print!("  RPC: {url} ... ");
            }

            match probe_chain_id(url).await {
                Err(err) => {
                    rpc.status = "error".to_string();
                    rpc.error = Some(err);
                    if !json_output {
                        println!("failed: {}", rpc.error.as_deref().unwrap_or(""));
                    }
                }
                Ok(id) => {
                    rpc.status = "ok".to_string();
                    rpc.chain_id = Some(id);
                    if !json_output {
                        print!("ok (chain id {id})");
                    }

                    match observed {
                        None => {
                            observed = Some(id);
                            result.observed_chain_id = Some(id);
                        }
                        Some(previous) if previous != id => {
                            if !json_output {
                                print!(" - WARNING: mismatch with previous RPC ({previous})");
                            }
                            result.inconsistent = true;
                        }
                        Some(_) => {}
                    }

                    if chain.chain_id != 0 {
                        if id != chain.chain_id {
                            rpc.error = Some(format!("mismatch, expected {}", chain.chain_id));
                            if !json_output {
                                print!(" - MISMATCH, expected {}", chain.chain_id);
                            }
                        } else if !json_output {
                            print!(" - verified");
                        }
                    } else {
                        chain.chain_id = id;
                        config_updated = true;
                        result.chain_id_updated = true;
                        if !json_output {
                            print!(" - updated config");
                            if dry_run {
                                print!(" (dry run)");
                            }
                        }
                    }
                    if !json_output {
                        println!();
                    }
                }
            }
            result.rpcs.push(rpc);
        }

        for token in &chain.tokens {
            let mut token_result = TokenResult {
                symbol: token.symbol.clone(),
                address: token.address.clone(),
                ..TokenResult::default()
            };
            match source
                .fetch_token_metadata(&chain.rpc_urls, &token.address)
                .await
            {
                Ok(metadata) => {
                    token_result.status = "ok".to_string();
                    token_result.onchain_decimals = Some(metadata.decimals);
                    token_result.decimals_mismatch = metadata.decimals != token.decimals;
                    if !json_output {
                        if token_result.decimals_mismatch {
                            println!(
                                "  Token {}: decimals mismatch (config {}, contract {})",
                                token.symbol, token.decimals, metadata.decimals
                            );
                        } else {
                            println!("  Token {}: ok", token.symbol);
                        }
                    }
                }
                Err(err) => {
                    token_result.status = "error".to_string();
                    token_result.error = Some(format!("{err:#}"));
                    if !json_output {
                        println!("  Token {}: failed: {err:#}", token.symbol);
                    }
                }
            }
            result.tokens.push(token_result);
        }

        if result.inconsistent {
            report.inconsistent_chains.push(chain.name.clone());
        }
        report.chains.push(result);
    }

    if !report.inconsistent_chains.is_empty() && !json_output {
        println!("\nWARNING: inconsistent RPCs detected!");
        println!("The following chains have RPCs returning conflicting chain ids:");
        for name in &report.inconsistent_chains {
            println!(" - {name}");
        }
    }

    if config_updated {
        report.config_updated = true;
        if !json_output {
            println!("\nUpdating configuration with fetched chain ids...");
        }
        if dry_run {
            if !json_output {
                println!("Dry run enabled: configuration NOT saved.");
            }
        } else {
            match config::save(&cfg, config_path) {
                Ok(()) => {
                    if !json_output {
                        println!("Configuration saved successfully.");
                    }
                }
                Err(err) => {
                    report.save_error = Some(format!("{err:#}"));
                    if !json_output {
                        println!("Failed to save config: {err:#}");
                    }
                }
            }
        }
    }

    emit(&report, json_output);
    0
}

async fn probe_chain_id(url: &str) -> Result<u64, String> {
    let attempt = async {
        let provider = eth::connect(url)?;
        eth::chain_id(&provider).await
    };
    match timeout(PROBE_TIMEOUT, attempt).await {
        Ok(Ok(id)) => Ok(id),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(_) => Err("timed out".to_string()),
    }
}

fn emit(report: &TestReport, json_output: bool) {
    if json_output {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("failed to encode report: {err}"),
        }
    }
}
