//! Configuration load/save behavior, including the legacy document shapes.

use std::fs;

use vigil::config::{self, AddressConfig, Config};

#[test]
fn parses_modern_document() {
    let doc = r#"{
        "addresses": [
            {"address": "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B", "name": "hot"},
            {"address": "0x1234567890123456789012345678901234567890"}
        ],
        "chains": [
            {
                "name": "Ethereum",
                "rpc_urls": ["https://rpc.example"],
                "symbol": "ETH",
                "price_id": "ethereum",
                "chain_id": 1,
                "explorer_url": "https://etherscan.io",
                "tokens": [
                    {"symbol": "USDC", "address": "0xa0b8", "decimals": 6, "price_id": "usd-coin"}
                ]
            },
            {
                "name": "Base",
                "rpc_urls": ["https://base.example"],
                "symbol": "ETH",
                "price_id": "ethereum"
            }
        ],
        "selected_chain": "Base",
        "fiat_decimals": 4
    }"#;

    let cfg = config::parse(doc).unwrap();
    assert_eq!(cfg.addresses.len(), 2);
    assert_eq!(cfg.addresses[0].name.as_deref(), Some("hot"));
    assert_eq!(cfg.chains.len(), 2);
    assert_eq!(cfg.chains[0].tokens[0].price_id, "usd-coin");
    assert_eq!(cfg.selected_chain, 1);

    // Explicit value wins; everything else defaults.
    assert_eq!(cfg.global.fiat_decimals, 4);
    assert_eq!(cfg.global.token_decimals, 2);
    assert_eq!(cfg.global.privacy_timeout_seconds, 60);
    assert!(!cfg.global.auto_cycle_enabled);
    assert_eq!(cfg.global.auto_cycle_interval_seconds, 15);
}

#[test]
fn accepts_legacy_price_id_key() {
    let doc = r#"{
        "chains": [
            {"name": "Ethereum", "rpc_urls": ["https://rpc.example"],
             "symbol": "ETH", "coingecko_id": "ethereum"}
        ]
    }"#;
    let cfg = config::parse(doc).unwrap();
    assert_eq!(cfg.chains[0].price_id, "ethereum");
}

#[test]
fn migrates_legacy_rpc_urls_and_bare_addresses() {
    let doc = r#"{
        "addresses": ["0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B"],
        "rpc_urls": ["https://one.example", "https://two.example"]
    }"#;

    let cfg = config::parse(doc).unwrap();
    assert_eq!(cfg.addresses.len(), 1);
    assert!(cfg.addresses[0].name.is_none());

    assert_eq!(cfg.chains.len(), 1);
    let chain = &cfg.chains[0];
    assert_eq!(chain.name, "Ethereum");
    assert_eq!(chain.symbol, "ETH");
    assert_eq!(chain.price_id, "ethereum");
    assert_eq!(chain.explorer_url.as_deref(), Some("https://etherscan.io"));
    assert_eq!(chain.rpc_urls.len(), 2);
    assert_eq!(cfg.selected_chain, 0);
}

#[test]
fn unknown_selected_chain_falls_back_to_first() {
    let doc = r#"{
        "chains": [
            {"name": "Ethereum", "rpc_urls": ["https://rpc.example"], "symbol": "ETH"}
        ],
        "selected_chain": "Gone"
    }"#;
    let cfg = config::parse(doc).unwrap();
    assert_eq!(cfg.selected_chain, 0);
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config::load(&dir.path().join("absent.json")).unwrap();
    assert!(cfg.addresses.is_empty());
    assert!(cfg.chains.is_empty());
    assert_eq!(cfg.global.privacy_timeout_seconds, 60);
}

#[test]
fn malformed_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");
    fs::write(&path, "{not json").unwrap();
    assert!(config::load(&path).is_err());
}

fn sample_config() -> Config {
    config::parse(
        r#"{
            "addresses": [{"address": "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B"}],
            "chains": [
                {"name": "Ethereum", "rpc_urls": ["https://rpc.example"], "symbol": "ETH",
                 "price_id": "ethereum"}
            ]
        }"#,
    )
    .unwrap()
}

#[test]
fn save_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");

    let cfg = sample_config();
    config::save(&cfg, &path).unwrap();

    let reloaded = config::load(&path).unwrap();
    assert_eq!(reloaded.addresses, cfg.addresses);
    assert_eq!(reloaded.chains, cfg.chains);
    assert_eq!(reloaded.selected_chain, 0);

    // The temp file from the atomic write is gone.
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn save_validates_structure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");

    let empty = Config::default();
    assert!(config::save(&empty, &path).is_err());

    let mut no_name = sample_config();
    no_name.chains[0].name = "  ".to_string();
    assert!(config::save(&no_name, &path).is_err());

    let mut no_urls = sample_config();
    no_urls.chains[0].rpc_urls.clear();
    assert!(config::save(&no_urls, &path).is_err());

    let mut duplicate = sample_config();
    let copy = duplicate.chains[0].clone();
    duplicate.chains.push(copy);
    assert!(config::save(&duplicate, &path).is_err());

    // Nothing was written by the failed saves.
    assert!(!path.exists());
}

#[test]
fn overwrite_creates_backup_and_restore_recovers_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");

    let mut cfg = sample_config();
    config::save(&cfg, &path).unwrap();
    let original = fs::read_to_string(&path).unwrap();

    cfg.addresses.push(AddressConfig {
        address: "0x1234567890123456789012345678901234567890".to_string(),
        name: Some("second".to_string()),
    });
    config::save(&cfg, &path).unwrap();

    let backups: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .collect();
    assert_eq!(backups.len(), 1);
    assert_eq!(
        fs::read_to_string(backups[0].path()).unwrap(),
        original,
        "backup holds the pre-save content"
    );

    assert_eq!(config::load(&path).unwrap().addresses.len(), 2);

    config::restore_last_backup(&path).unwrap();
    assert_eq!(config::load(&path).unwrap().addresses.len(), 1);
}

#[test]
fn restore_without_backups_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfg.json");
    fs::write(&path, "{}").unwrap();
    assert!(config::restore_last_backup(&path).is_err());
}
