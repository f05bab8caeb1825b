//! The data-source boundary.
//!
//! This trait is the core's only external dependency shape: the real
//! implementation wraps the EVM JSON-RPC transport and the price oracle,
//! while tests inject a scripted double. Nothing else in the watcher talks
//! to the network.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::ChainConfig;
use crate::domain::model::{ChainData, GasPriceData, PriceData, TxRecord};

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Current USD price for one oracle asset id.
    async fn fetch_price(&self, coin_id: &str) -> Result<PriceData>;

    /// Bulk fetch of native and token balances for every address on one
    /// chain. `chain.rpc_urls` arrives already prioritized; the result
    /// carries partial successes and the URLs that produced any failure.
    async fn fetch_chain_data(
        &self,
        chain: &ChainConfig,
        addresses: &[String],
    ) -> Result<ChainData>;

    /// Gas price in wei from the first URL that answers.
    async fn fetch_gas_price(&self, rpc_urls: &[String]) -> Result<GasPriceData>;

    /// Up to five recent transactions touching `address`, plus the URLs
    /// that failed before one produced records.
    async fn fetch_transactions(
        &self,
        address: &str,
        rpc_urls: &[String],
        decimals: usize,
    ) -> Result<(Vec<TxRecord>, Vec<String>)>;

    /// Dial the endpoint and issue the cheapest head call, returning the
    /// elapsed time. Routed through this boundary so the scheduler stays
    /// network-free under a scripted source.
    async fn probe_latency(&self, url: &str) -> Result<Duration>;
}
