//! The real data source: bulk balance fetches, transaction scanning, gas
//! prices, and latency probes over EVM JSON-RPC.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ChainConfig;
use crate::domain::format;
use crate::domain::model::{
    AccountChainData, Amount, ChainData, GasPriceData, PriceData, TokenMetadata, TxRecord,
};
use crate::infrastructure::ethereum::{
    self as eth, EvmProvider, SELECTOR_DECIMALS, SELECTOR_SYMBOL,
};
use crate::infrastructure::price::PriceOracle;
use crate::watcher::DataSource;

/// Time limit for one URL attempt during a bulk fetch.
pub const CHAIN_DATA_TIMEOUT: Duration = Duration::from_secs(30);
/// Time limit for one URL attempt during a transaction scan, a gas read, or
/// a metadata lookup.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);
/// Time limit for a latency probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocks in roughly one day at a 12 s cadence; the historical balance read.
const DAY_BLOCKS: u64 = 7200;
/// How many head blocks a transaction scan walks.
const SCAN_DEPTH: u64 = 10;
/// Scan stops once this many matches are found.
const SCAN_MAX_RECORDS: usize = 5;
/// Concurrent per-address fetches on one connection.
const WORKER_POOL: usize = 5;
/// Balance read attempts per address per URL.
const BALANCE_ATTEMPTS: u32 = 3;
/// Linear backoff step between balance attempts.
const BALANCE_BACKOFF: Duration = Duration::from_millis(200);

pub struct EvmDataSource {
    oracle: PriceOracle,
}

impl EvmDataSource {
    pub fn new(oracle: PriceOracle) -> Self {
        Self { oracle }
    }

    /// Fetch an ERC-20's `symbol()` and `decimals()` from the first URL that
    /// answers.
    pub async fn fetch_token_metadata(
        &self,
        rpc_urls: &[String],
        token_address: &str,
    ) -> Result<TokenMetadata> {
        let mut last_err = anyhow!("no RPC URLs configured");
        for url in rpc_urls {
            match timeout(CALL_TIMEOUT, fetch_metadata_on_url(url, token_address)).await {
                Ok(Ok(metadata)) => return Ok(metadata),
                Ok(Err(err)) => last_err = err,
                Err(_) => last_err = anyhow!("metadata lookup on {url} timed out"),
            }
        }
        Err(last_err.context(format!("fetching metadata for {token_address}")))
    }
}

#[async_trait]
impl DataSource for EvmDataSource {
    async fn fetch_price(&self, coin_id: &str) -> Result<PriceData> {
        self.oracle.fetch(coin_id).await
    }

    /// The per-chain bulk fetch protocol. URLs are tried in the order given;
    /// each attempt covers every still-pending address; only addresses that
    /// failed move on to the next URL. A URL lands in `failed_urls` exactly
    /// when at least one address failed on it.
    async fn fetch_chain_data(
        &self,
        chain: &ChainConfig,
        addresses: &[String],
    ) -> Result<ChainData> {
        let mut results = Vec::new();
        let mut failed_urls = Vec::new();
        let mut pending: Vec<String> = addresses.to_vec();
        let mut last_err: Option<String> = None;

        for url in &chain.rpc_urls {
            if pending.is_empty() {
                break;
            }
            match timeout(CHAIN_DATA_TIMEOUT, fetch_chain_on_url(url, chain, &pending)).await {
                Ok(Ok(outcome)) => {
                    results.extend(outcome.results);
                    if !outcome.pending.is_empty() {
                        failed_urls.push(url.clone());
                        last_err = outcome.last_err.or(last_err);
                    }
                    pending = outcome.pending;
                }
                Ok(Err(err)) => {
                    debug!(chain = %chain.name, url, error = %err, "bulk fetch attempt failed");
                    failed_urls.push(url.clone());
                    last_err = Some(format!("{err:#}"));
                }
                Err(_) => {
                    warn!(chain = %chain.name, url, "bulk fetch attempt timed out");
                    failed_urls.push(url.clone());
                    last_err = Some(format!("{url} timed out"));
                }
            }
        }

        let error = if pending.is_empty() { None } else { last_err };
        Ok(ChainData {
            chain_name: chain.name.clone(),
            results,
            failed_urls,
            error,
        })
    }

    async fn fetch_gas_price(&self, rpc_urls: &[String]) -> Result<GasPriceData> {
        let mut failed_urls = Vec::new();
        let mut last_err = anyhow!("no RPC URLs configured");

        for url in rpc_urls {
            let attempt = async {
                let provider = eth::connect(url)?;
                eth::gas_price(&provider).await
            };
            match timeout(CALL_TIMEOUT, attempt).await {
                Ok(Ok(wei)) => {
                    return Ok(GasPriceData { wei, failed_urls });
                }
                Ok(Err(err)) => {
                    failed_urls.push(url.clone());
                    last_err = err;
                }
                Err(_) => {
                    failed_urls.push(url.clone());
                    last_err = anyhow!("gas price on {url} timed out");
                }
            }
        }
        Err(last_err)
    }

    /// Scan the latest blocks for transactions touching `address`. A URL
    /// counts as failed only when it produced no records and an error
    /// occurred; partial results are returned as-is.
    async fn fetch_transactions(
        &self,
        address: &str,
        rpc_urls: &[String],
        decimals: usize,
    ) -> Result<(Vec<TxRecord>, Vec<String>)> {
        let mut failed_urls = Vec::new();
        let mut last_err = anyhow!("no RPC URLs configured");

        for url in rpc_urls {
            match timeout(CALL_TIMEOUT, scan_on_url(url, address, decimals)).await {
                Ok(Ok(records)) => return Ok((records, failed_urls)),
                Ok(Err(err)) => {
                    failed_urls.push(url.clone());
                    last_err = err;
                }
                Err(_) => {
                    failed_urls.push(url.clone());
                    last_err = anyhow!("transaction scan on {url} timed out");
                }
            }
        }
        Err(last_err)
    }

    async fn probe_latency(&self, url: &str) -> Result<Duration> {
        let start = Instant::now();
        let attempt = async {
            let provider = eth::connect(url)?;
            eth::head_block_number(&provider).await
        };
        timeout(PROBE_TIMEOUT, attempt)
            .await
            .map_err(|_| anyhow!("probe of {url} timed out"))??;
        Ok(start.elapsed())
    }
}

struct UrlOutcome {
    results: Vec<AccountChainData>,
    /// Addresses that failed on this URL and stay pending.
    pending: Vec<String>,
    last_err: Option<String>,
}

async fn fetch_chain_on_url(
    url: &str,
    chain: &ChainConfig,
    pending: &[String],
) -> Result<UrlOutcome> {
    let provider = eth::connect(url)?;
    // Head read doubles as the connection check; on failure every address
    // stays pending.
    let head = eth::head_block_number(&provider).await?;
    let old_block = head.saturating_sub(DAY_BLOCKS);

    let pool = pending.len().min(WORKER_POOL).max(1);
    let outcomes: Vec<(String, Result<AccountChainData>)> = stream::iter(pending.iter().cloned())
        .map(|address| {
            let provider = &provider;
            async move {
                let result = fetch_account(provider, chain, &address, old_block).await;
                (address, result)
            }
        })
        .buffer_unordered(pool)
        .collect()
        .await;

    let mut results = Vec::new();
    let mut still_pending = Vec::new();
    let mut last_err = None;
    for (address, outcome) in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(err) => {
                debug!(chain = %chain.name, url, address, error = %err, "account fetch failed");
                last_err = Some(format!("{err:#}"));
                still_pending.push(address);
            }
        }
    }

    Ok(UrlOutcome {
        results,
        pending: still_pending,
        last_err,
    })
}

async fn fetch_account(
    provider: &EvmProvider,
    chain: &ChainConfig,
    address: &str,
    old_block: u64,
) -> Result<AccountChainData> {
    let owner = eth::parse_address(address)
        .ok_or_else(|| anyhow!("invalid address {address}"))?;

    let balance = balance_with_retry(provider, &owner).await?;

    // Best effort, no retry; absence is fine.
    let balance_24h = eth::get_balance(provider, &owner, &format!("0x{old_block:x}"))
        .await
        .ok()
        .map(Amount::from_wei);

    let mut token_balances = HashMap::new();
    for token in &chain.tokens {
        let calldata = eth::encode_balance_of(&owner);
        let output = eth::call(provider, &token.address, &calldata)
            .await
            .with_context(|| format!("balanceOf {} for {address}", token.symbol))?;
        let raw = eth::decode_u256(&output);
        token_balances.insert(token.symbol.clone(), Amount::new(raw, token.decimals));
    }

    Ok(AccountChainData {
        address: address.to_string(),
        balance: Amount::from_wei(balance),
        balance_24h,
        token_balances,
    })
}

async fn balance_with_retry(provider: &EvmProvider, owner: &Address) -> Result<U256> {
    let mut last_err = None;
    for attempt in 1..=BALANCE_ATTEMPTS {
        match eth::get_balance(provider, owner, "latest").await {
            Ok(balance) => return Ok(balance),
            Err(err) => {
                last_err = Some(err);
                if attempt < BALANCE_ATTEMPTS {
                    tokio::time::sleep(BALANCE_BACKOFF * attempt).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt"))
}

async fn scan_on_url(url: &str, address: &str, decimals: usize) -> Result<Vec<TxRecord>> {
    let provider = eth::connect(url)?;
    let head = eth::head_block_number(&provider).await?;

    let mut records = Vec::new();
    let mut block_err: Option<anyhow::Error> = None;

    for offset in 0..SCAN_DEPTH {
        if records.len() >= SCAN_MAX_RECORDS {
            break;
        }
        let Some(number) = head.checked_sub(offset) else {
            break;
        };
        let block = match eth::get_block(&provider, number).await {
            Ok(Some(block)) => block,
            Ok(None) => continue,
            Err(err) => {
                block_err = Some(err);
                continue;
            }
        };
        for tx in &block.transactions {
            if records.len() >= SCAN_MAX_RECORDS {
                break;
            }
            let is_from = tx.from.eq_ignore_ascii_case(address);
            let is_to = tx
                .to
                .as_deref()
                .map(|to| to.eq_ignore_ascii_case(address))
                .unwrap_or(false);
            if is_from || is_to {
                records.push(to_record(tx, block.number, decimals));
            }
        }
    }

    if records.is_empty() {
        if let Some(err) = block_err {
            return Err(err);
        }
    }
    Ok(records)
}

fn to_record(tx: &eth::RawTransaction, block_number: u64, decimals: usize) -> TxRecord {
    let gwei = Amount::new(tx.gas_price, 9).to_f64();
    TxRecord {
        hash: tx.hash.clone(),
        from: tx.from.clone(),
        to: tx.to.clone().unwrap_or_else(|| "Contract".to_string()),
        value: format::group_thousands(&Amount::from_wei(tx.value).format(decimals)),
        block_number,
        gas_limit: tx.gas,
        gas_price: format!("{gwei:.2} Gwei"),
        nonce: tx.nonce,
    }
}

async fn fetch_metadata_on_url(url: &str, token_address: &str) -> Result<TokenMetadata> {
    let provider = eth::connect(url)?;

    let symbol_bytes = eth::call(&provider, token_address, &SELECTOR_SYMBOL).await?;
    let symbol = decode_symbol(&symbol_bytes);

    let decimals_bytes = eth::call(&provider, token_address, &SELECTOR_DECIMALS).await?;
    if decimals_bytes.is_empty() {
        anyhow::bail!("empty decimals() result from {url}");
    }
    let decimals = u8::try_from(eth::decode_u256(&decimals_bytes))
        .map_err(|_| anyhow!("decimals() out of range"))?;

    Ok(TokenMetadata { symbol, decimals })
}

/// `symbol()` comes back either as a `bytes32` or as an ABI-encoded string.
fn decode_symbol(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    if bytes.len() == 32 {
        let trimmed: Vec<u8> = bytes.iter().copied().take_while(|b| *b != 0).collect();
        return String::from_utf8_lossy(&trimmed).into_owned();
    }
    if bytes.len() >= 64 {
        let len = eth::decode_u256(&bytes[32..64]);
        let len = usize::try_from(len).unwrap_or(0);
        if len > 0 && 64 + len <= bytes.len() {
            return String::from_utf8_lossy(&bytes[64..64 + len]).into_owned();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bytes32_symbol() {
        let mut raw = vec![0u8; 32];
        raw[..4].copy_from_slice(b"WETH");
        assert_eq!(decode_symbol(&raw), "WETH");
    }

    #[test]
    fn decodes_abi_string_symbol() {
        let mut raw = vec![0u8; 96];
        raw[31] = 0x20; // offset
        raw[63] = 4; // length
        raw[64..68].copy_from_slice(b"TEST");
        assert_eq!(decode_symbol(&raw), "TEST");
    }

    #[test]
    fn record_formats_value_and_gas() {
        let tx = eth::RawTransaction {
            hash: "0xabc".into(),
            from: "0x1234".into(),
            to: None,
            value: U256::from(1_000_000_000_000_000_000u128),
            gas: 21000,
            gas_price: U256::from(20_000_000_000u64),
            nonce: 1,
        };
        let record = to_record(&tx, 0x1000, 4);
        assert_eq!(record.value, "1.0000");
        assert_eq!(record.gas_price, "20.00 Gwei");
        assert_eq!(record.to, "Contract");
    }
}
