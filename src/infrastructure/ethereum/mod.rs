//! Alloy provider plumbing and raw JSON-RPC helpers.
//!
//! Blocks are fetched and decoded as raw JSON rather than through typed
//! transaction envelopes so that every EVM chain works, including L2s with
//! nonstandard transaction types.

pub mod fetch;

use alloy::primitives::{Address, U256};
use alloy::providers::{
    fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller},
    Identity, Provider, ProviderBuilder, RootProvider,
};
use anyhow::{Context, Result};

pub(crate) type EvmProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider,
>;

/// ERC-20 `balanceOf(address)`.
pub const SELECTOR_BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
/// ERC-20 `symbol()`.
pub const SELECTOR_SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
/// ERC-20 `decimals()`.
pub const SELECTOR_DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

pub(crate) fn connect(url: &str) -> Result<EvmProvider> {
    let rpc_url = url.parse().with_context(|| format!("invalid RPC URL {url}"))?;
    Ok(ProviderBuilder::new().connect_http(rpc_url))
}

/// Block data decoded from raw JSON; only the fields the watcher reads.
#[derive(Debug, Clone)]
pub struct RawBlock {
    pub number: u64,
    pub transactions: Vec<RawTransaction>,
}

#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub hash: String,
    /// Sender as recovered by the node under the chain's signing rules.
    pub from: String,
    /// Absent for contract creation.
    pub to: Option<String>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: U256,
    pub nonce: u64,
}

/// Number of the latest block, read from the head header.
pub(crate) async fn head_block_number(provider: &EvmProvider) -> Result<u64> {
    let json: serde_json::Value = provider
        .raw_request("eth_getBlockByNumber".into(), ("latest", false))
        .await
        .context("eth_getBlockByNumber(latest)")?;
    if json.is_null() {
        anyhow::bail!("node returned no head block");
    }
    parse_hex_u64(json.get("number").and_then(|v| v.as_str()).unwrap_or("0x0"))
}

/// Fetch a block with full transactions. `Ok(None)` when the node does not
/// have it.
pub(crate) async fn get_block(provider: &EvmProvider, number: u64) -> Result<Option<RawBlock>> {
    let tag = format!("0x{number:x}");
    let json: serde_json::Value = provider
        .raw_request("eth_getBlockByNumber".into(), (&tag, true))
        .await
        .with_context(|| format!("eth_getBlockByNumber({tag})"))?;
    if json.is_null() {
        return Ok(None);
    }
    Ok(Some(parse_raw_block(&json)?))
}

/// Native balance at a block tag (`"latest"` or `"0x..."`).
pub(crate) async fn get_balance(
    provider: &EvmProvider,
    address: &Address,
    block_tag: &str,
) -> Result<U256> {
    let hex: String = provider
        .raw_request("eth_getBalance".into(), (address.to_string(), block_tag))
        .await
        .context("eth_getBalance")?;
    parse_hex_u256(&hex)
}

/// `eth_call` against a contract, returning the raw result bytes.
pub(crate) async fn call(provider: &EvmProvider, to: &str, data: &[u8]) -> Result<Vec<u8>> {
    let params = serde_json::json!({
        "to": to,
        "data": format!("0x{}", hex::encode(data)),
    });
    let hex: String = provider
        .raw_request("eth_call".into(), (params, "latest"))
        .await
        .context("eth_call")?;
    let stripped = hex.strip_prefix("0x").unwrap_or(&hex);
    hex::decode(stripped).context("decoding eth_call result")
}

pub(crate) async fn gas_price(provider: &EvmProvider) -> Result<u128> {
    let hex: String = provider
        .raw_request("eth_gasPrice".into(), ())
        .await
        .context("eth_gasPrice")?;
    parse_hex_u128(&hex)
}

pub(crate) async fn chain_id(provider: &EvmProvider) -> Result<u64> {
    let hex: String = provider
        .raw_request("eth_chainId".into(), ())
        .await
        .context("eth_chainId")?;
    parse_hex_u64(&hex)
}

/// `balanceOf(owner)` calldata: selector plus the address right-padded to
/// 32 bytes.
pub(crate) fn encode_balance_of(owner: &Address) -> Vec<u8> {
    let mut data = SELECTOR_BALANCE_OF.to_vec();
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(owner.as_slice());
    data
}

pub(crate) fn parse_address(s: &str) -> Option<Address> {
    let normalized = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if normalized.len() != 40 {
        return None;
    }
    let bytes = hex::decode(normalized).ok()?;
    Some(Address::from_slice(&bytes))
}

fn parse_raw_block(json: &serde_json::Value) -> Result<RawBlock> {
    let number = parse_hex_u64(json.get("number").and_then(|v| v.as_str()).unwrap_or("0x0"))?;

    let mut transactions = Vec::new();
    if let Some(txs) = json.get("transactions").and_then(|v| v.as_array()) {
        for tx in txs {
            if let Some(tx) = parse_raw_transaction(tx) {
                transactions.push(tx);
            }
        }
    }

    Ok(RawBlock {
        number,
        transactions,
    })
}

fn parse_raw_transaction(json: &serde_json::Value) -> Option<RawTransaction> {
    let hash = json.get("hash")?.as_str()?.to_string();
    let from = json.get("from")?.as_str()?.to_string();
    let to = json
        .get("to")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let value =
        parse_hex_u256(json.get("value").and_then(|v| v.as_str()).unwrap_or("0x0")).ok()?;
    let gas = parse_hex_u64(json.get("gas").and_then(|v| v.as_str()).unwrap_or("0x0")).ok()?;
    let gas_price = parse_hex_u256(
        json.get("gasPrice")
            .and_then(|v| v.as_str())
            .unwrap_or("0x0"),
    )
    .ok()?;
    let nonce = parse_hex_u64(json.get("nonce").and_then(|v| v.as_str()).unwrap_or("0x0")).ok()?;

    Some(RawTransaction {
        hash,
        from,
        to,
        value,
        gas,
        gas_price,
        nonce,
    })
}

pub(crate) fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).with_context(|| format!("parsing hex u64 {s:?}"))
}

pub(crate) fn parse_hex_u128(s: &str) -> Result<u128> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16).with_context(|| format!("parsing hex u128 {s:?}"))
}

pub(crate) fn parse_hex_u256(s: &str) -> Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(s, 16).with_context(|| format!("parsing hex u256 {s:?}"))
}

/// Interpret an `eth_call` return as a big-endian integer.
pub(crate) fn decode_u256(bytes: &[u8]) -> U256 {
    if bytes.len() >= 32 {
        U256::from_be_slice(&bytes[..32])
    } else {
        U256::from_be_slice(bytes)
    }
}
