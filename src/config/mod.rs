//! Persisted JSON configuration.
//!
//! A single document holds the monitored addresses, the chain descriptors,
//! and UI settings. Two legacy shapes are still accepted on load: a root
//! `rpc_urls` list (pre-multichain configs, synthesized into an Ethereum
//! chain) and bare address strings in `addresses`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = ".vigil.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    /// Identifier understood by the price oracle.
    #[serde(default, alias = "coingecko_id")]
    pub price_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressConfig {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Native unit, e.g. `ETH`.
    pub symbol: String,
    #[serde(default, alias = "coingecko_id")]
    pub price_id: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub chain_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub privacy_timeout_seconds: u64,
    pub fiat_decimals: usize,
    pub token_decimals: usize,
    pub auto_cycle_enabled: bool,
    pub auto_cycle_interval_seconds: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            privacy_timeout_seconds: 60,
            fiat_decimals: 2,
            token_decimals: 2,
            auto_cycle_enabled: false,
            auto_cycle_interval_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub addresses: Vec<AddressConfig>,
    pub chains: Vec<ChainConfig>,
    /// Index into `chains` of the chain shown by default.
    pub selected_chain: usize,
    pub global: GlobalConfig,
}

/// On-disk shape, tolerant of the legacy fields.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    addresses: serde_json::Value,
    #[serde(default)]
    rpc_urls: Vec<String>,
    #[serde(default)]
    chains: Vec<ChainConfig>,
    #[serde(default)]
    selected_chain: String,
    privacy_timeout_seconds: Option<u64>,
    fiat_decimals: Option<usize>,
    token_decimals: Option<usize>,
    auto_cycle_enabled: Option<bool>,
    auto_cycle_interval_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RawConfigOut<'a> {
    addresses: &'a [AddressConfig],
    chains: &'a [ChainConfig],
    selected_chain: &'a str,
    privacy_timeout_seconds: u64,
    fiat_decimals: usize,
    token_decimals: usize,
    auto_cycle_enabled: bool,
    auto_cycle_interval_seconds: u64,
}

/// Resolve the config path: an explicit override wins, otherwise
/// `$HOME/.vigil.json`.
pub fn default_path(custom: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = custom {
        return Ok(path.to_path_buf());
    }
    let dirs = directories::BaseDirs::new().context("cannot determine home directory")?;
    Ok(dirs.home_dir().join(CONFIG_FILE_NAME))
}

/// Load the configuration. A missing file yields the empty default.
pub fn load(path: &Path) -> Result<Config> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Config::default());
        }
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    parse(&content).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse(content: &str) -> Result<Config> {
    let raw: RawConfig = serde_json::from_str(content)?;

    let addresses = decode_addresses(&raw.addresses);

    let mut chains = raw.chains;
    let mut selected_name = raw.selected_chain;
    if chains.is_empty() && !raw.rpc_urls.is_empty() {
        chains = vec![ChainConfig {
            name: "Ethereum".to_string(),
            rpc_urls: raw.rpc_urls,
            symbol: "ETH".to_string(),
            price_id: "ethereum".to_string(),
            chain_id: 0,
            explorer_url: Some("https://etherscan.io".to_string()),
            tokens: Vec::new(),
        }];
        selected_name = "Ethereum".to_string();
    }

    let selected_chain = chains
        .iter()
        .position(|c| c.name == selected_name)
        .unwrap_or(0);

    let defaults = GlobalConfig::default();
    let global = GlobalConfig {
        privacy_timeout_seconds: raw
            .privacy_timeout_seconds
            .unwrap_or(defaults.privacy_timeout_seconds),
        fiat_decimals: raw.fiat_decimals.unwrap_or(defaults.fiat_decimals),
        token_decimals: raw.token_decimals.unwrap_or(defaults.token_decimals),
        auto_cycle_enabled: raw
            .auto_cycle_enabled
            .unwrap_or(defaults.auto_cycle_enabled),
        auto_cycle_interval_seconds: raw
            .auto_cycle_interval_seconds
            .unwrap_or(defaults.auto_cycle_interval_seconds),
    };

    Ok(Config {
        addresses,
        chains,
        selected_chain,
        global,
    })
}

/// `addresses` is either `[{address, name}]` or a bare `["0x..."]` list.
fn decode_addresses(value: &serde_json::Value) -> Vec<AddressConfig> {
    if value.is_null() {
        return Vec::new();
    }
    if let Ok(addresses) = serde_json::from_value::<Vec<AddressConfig>>(value.clone()) {
        return addresses;
    }
    match serde_json::from_value::<Vec<String>>(value.clone()) {
        Ok(bare) => bare
            .into_iter()
            .map(|address| AddressConfig {
                address,
                name: None,
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Validate and persist the configuration.
///
/// The destination is written atomically (`<path>.tmp` then rename); if a
/// file already exists it is first copied to a timestamped `.bak`.
pub fn save(config: &Config, path: &Path) -> Result<()> {
    if config.chains.is_empty() {
        bail!("validation failed: configuration must have at least one chain");
    }
    let mut seen = std::collections::HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        if chain.name.trim().is_empty() {
            bail!("validation failed: chain at index {i} has no name");
        }
        if chain.rpc_urls.is_empty() {
            bail!("validation failed: chain {} has no RPC URLs", chain.name);
        }
        // The chain name is the join key across every per-chain map.
        if !seen.insert(chain.name.clone()) {
            bail!("validation failed: duplicate chain name {}", chain.name);
        }
    }

    let selected_name = config
        .chains
        .get(config.selected_chain)
        .map(|c| c.name.as_str())
        .unwrap_or("");

    let out = RawConfigOut {
        addresses: &config.addresses,
        chains: &config.chains,
        selected_chain: selected_name,
        privacy_timeout_seconds: config.global.privacy_timeout_seconds,
        fiat_decimals: config.global.fiat_decimals,
        token_decimals: config.global.token_decimals,
        auto_cycle_enabled: config.global.auto_cycle_enabled,
        auto_cycle_interval_seconds: config.global.auto_cycle_interval_seconds,
    };
    let data = serde_json::to_vec_pretty(&out)?;

    if path.exists() {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let backup = backup_path(path, &stamp);
        fs::copy(path, &backup).with_context(|| format!("writing backup {}", backup.display()))?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, &data).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{stamp}.bak"));
    PathBuf::from(name)
}

/// Copy the most recent `<path>.*.bak` back over the config file.
pub fn restore_last_backup(path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("config path has no file name")?;
    let prefix = format!("{file_name}.");

    let mut backups: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
                .unwrap_or(false)
        })
        .collect();

    if backups.is_empty() {
        bail!("no backup files found");
    }
    backups.sort();
    let last = backups.last().expect("non-empty");
    fs::copy(last, path).with_context(|| format!("restoring {}", last.display()))?;
    Ok(())
}
