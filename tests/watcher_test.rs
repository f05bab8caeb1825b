//! Watcher core tests against a scripted data source. No network involved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use anyhow::Result;
use async_trait::async_trait;

use vigil::config::{AddressConfig, ChainConfig, GlobalConfig, TokenConfig};
use vigil::domain::model::{
    AccountChainData, Amount, ChainData, GasPriceData, PriceData, TxRecord,
};
use vigil::watcher::{DataSource, Event, Watcher};

const ADDRESS: &str = "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B";

/// Scripted data source: answers every fetch from fixed values.
struct ScriptedSource {
    price_usd: f64,
    balance_wei: U256,
    token_raw: U256,
    gas_wei: u128,
    failed_urls: Vec<String>,
    transactions: Vec<TxRecord>,
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self {
            // 2.5 native coins
            price_usd: 2500.50,
            balance_wei: U256::from(2_500_000_000_000_000_000u128),
            token_raw: U256::from(500_000_000u64),
            gas_wei: 20_000_000_000,
            failed_urls: Vec::new(),
            transactions: vec![sample_tx()],
        }
    }
}

fn sample_tx() -> TxRecord {
    TxRecord {
        hash: "0xdead".to_string(),
        from: "0x1111111111111111111111111111111111111111".to_string(),
        to: ADDRESS.to_string(),
        value: "1.0000".to_string(),
        block_number: 0x1000,
        gas_limit: 21000,
        gas_price: "20.00 Gwei".to_string(),
        nonce: 1,
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch_price(&self, coin_id: &str) -> Result<PriceData> {
        Ok(PriceData {
            coin_id: coin_id.to_string(),
            usd: self.price_usd,
        })
    }

    async fn fetch_chain_data(
        &self,
        chain: &ChainConfig,
        addresses: &[String],
    ) -> Result<ChainData> {
        let results = addresses
            .iter()
            .map(|address| {
                let token_balances: HashMap<String, Amount> = chain
                    .tokens
                    .iter()
                    .map(|t| (t.symbol.clone(), Amount::new(self.token_raw, t.decimals)))
                    .collect();
                AccountChainData {
                    address: address.clone(),
                    balance: Amount::from_wei(self.balance_wei),
                    balance_24h: None,
                    token_balances,
                }
            })
            .collect();
        Ok(ChainData {
            chain_name: chain.name.clone(),
            results,
            failed_urls: self.failed_urls.clone(),
            error: None,
        })
    }

    async fn fetch_gas_price(&self, _rpc_urls: &[String]) -> Result<GasPriceData> {
        Ok(GasPriceData {
            wei: self.gas_wei,
            failed_urls: self.failed_urls.clone(),
        })
    }

    async fn fetch_transactions(
        &self,
        _address: &str,
        _rpc_urls: &[String],
        _decimals: usize,
    ) -> Result<(Vec<TxRecord>, Vec<String>)> {
        Ok((self.transactions.clone(), Vec::new()))
    }

    async fn probe_latency(&self, _url: &str) -> Result<Duration> {
        Ok(Duration::from_millis(5))
    }
}

fn mock_chain() -> ChainConfig {
    ChainConfig {
        name: "MockChain".to_string(),
        rpc_urls: vec!["http://mock.invalid".to_string()],
        symbol: "MCK".to_string(),
        price_id: "ethereum".to_string(),
        chain_id: 0,
        explorer_url: None,
        tokens: vec![TokenConfig {
            symbol: "TEST".to_string(),
            address: "0x1234567890123456789012345678901234567890".to_string(),
            decimals: 6,
            price_id: String::new(),
        }],
    }
}

fn new_watcher(source: ScriptedSource) -> Arc<Watcher> {
    let addresses = vec![AddressConfig {
        address: ADDRESS.to_string(),
        name: Some("hot wallet".to_string()),
    }];
    Arc::new(Watcher::new(
        &addresses,
        vec![mock_chain()],
        GlobalConfig::default(),
        Arc::new(source),
    ))
}

#[tokio::test]
async fn full_tick_populates_snapshot_and_emits_events() {
    let watcher = new_watcher(ScriptedSource::default());
    let mut subscription = watcher.subscribe();

    watcher.fetch_all().await;

    let accounts = watcher.get_accounts();
    assert_eq!(accounts.len(), 1);
    let account = &accounts[0];
    assert_eq!(account.balances["MockChain"].to_f64(), 2.5);
    assert_eq!(account.token_balances["MockChain"]["TEST"].to_f64(), 500.0);
    assert!(account.errors.is_empty());
    assert_eq!(account.transactions, vec![sample_tx()]);

    assert_eq!(watcher.get_prices()["ethereum"], 2500.50);
    assert_eq!(watcher.get_gas_prices()["MockChain"], 20_000_000_000);

    let mut kinds = Vec::new();
    while let Some(event) = subscription.try_recv() {
        kinds.push(match event {
            Event::PriceUpdated(_) => "price",
            Event::ChainDataUpdated(_) => "chain",
            Event::GasPriceUpdated { .. } => "gas",
            Event::TransactionsUpdated { .. } => "txs",
            Event::StatusUpdated => "status",
        });
    }
    for expected in ["price", "chain", "gas", "txs"] {
        assert_eq!(
            kinds.iter().filter(|k| **k == expected).count(),
            1,
            "expected exactly one {expected} event, got {kinds:?}"
        );
    }
}

#[tokio::test]
async fn ticks_are_idempotent() {
    let watcher = new_watcher(ScriptedSource::default());

    watcher.fetch_all().await;
    let first = serde_json::to_value(watcher.get_accounts()).unwrap();

    watcher.fetch_all().await;
    let second = serde_json::to_value(watcher.get_accounts()).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn merge_matches_addresses_case_insensitively() {
    let watcher = new_watcher(ScriptedSource::default());

    let data = ChainData {
        chain_name: "MockChain".to_string(),
        results: vec![AccountChainData {
            address: ADDRESS.to_lowercase(),
            balance: Amount::from_wei(U256::from(1u64)),
            balance_24h: None,
            token_balances: HashMap::new(),
        }],
        failed_urls: Vec::new(),
        error: None,
    };
    watcher.merge_chain_data(&data);

    let accounts = watcher.get_accounts();
    assert!(accounts[0].balances.contains_key("MockChain"));
    // The stored canonical form is the one config supplied.
    assert_eq!(accounts[0].address, ADDRESS);
}

#[tokio::test]
async fn chain_error_only_set_without_prior_success() {
    let watcher = new_watcher(ScriptedSource::default());

    // No data yet: error is recorded.
    watcher.set_chain_error("MockChain", "dial failed");
    assert_eq!(
        watcher.get_accounts()[0].errors["MockChain"],
        "dial failed"
    );

    // After a successful merge the error is cleared...
    watcher.fetch_all().await;
    assert!(watcher.get_accounts()[0].errors.is_empty());

    // ...and a later transient failure does not overwrite good data.
    watcher.set_chain_error("MockChain", "transient");
    assert!(watcher.get_accounts()[0].errors.is_empty());
}

#[tokio::test]
async fn slow_subscriber_drops_events_without_blocking() {
    let watcher = new_watcher(ScriptedSource::default());

    let mut drained = watcher.subscribe();
    let mut unread = watcher.subscribe();

    let mut drained_count = 0usize;
    for _ in 0..101 {
        watcher.publish(Event::StatusUpdated);
        // The drained subscriber keeps up; the unread one never reads.
        if drained.try_recv().is_some() {
            drained_count += 1;
        }
    }
    assert_eq!(drained_count, 101);

    let mut unread_count = 0usize;
    while unread.try_recv().is_some() {
        unread_count += 1;
    }
    // Sink capacity is 100; the 101st event was dropped for this subscriber.
    assert_eq!(unread_count, 100);
}

#[tokio::test]
async fn recent_transactions_are_bounded() {
    let watcher = new_watcher(ScriptedSource::default());

    let many: Vec<_> = (0..9)
        .map(|i| TxRecord {
            nonce: i,
            ..sample_tx()
        })
        .collect();
    watcher.set_transactions(ADDRESS, many);

    assert_eq!(watcher.get_accounts()[0].transactions.len(), 5);
}

#[tokio::test]
async fn unsubscribe_detaches_sink() {
    let watcher = new_watcher(ScriptedSource::default());

    let first = watcher.subscribe();
    watcher.unsubscribe(first);

    let mut second = watcher.subscribe();
    watcher.publish(Event::StatusUpdated);
    assert!(second.try_recv().is_some());
    assert!(second.try_recv().is_none());
}

#[tokio::test]
async fn failed_urls_from_fetch_enter_cooldown() {
    let source = ScriptedSource {
        failed_urls: vec!["http://mock.invalid".to_string()],
        ..ScriptedSource::default()
    };
    let watcher = new_watcher(source);

    watcher.fetch_all().await;

    let health = watcher.health().snapshot();
    let entry = &health["http://mock.invalid"];
    let remaining = entry
        .cooldown_remaining(std::time::Instant::now())
        .expect("cooldown set");
    assert!(remaining > Duration::from_secs(4 * 60));
    assert!(remaining <= Duration::from_secs(5 * 60));
}

#[tokio::test]
async fn scheduler_stops_within_a_tick() {
    let watcher = new_watcher(ScriptedSource::default());

    let handle = watcher.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    watcher.stop();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler exits after stop")
        .expect("scheduler task completes");
}

#[tokio::test]
async fn force_refresh_triggers_immediate_fetch() {
    let watcher = new_watcher(ScriptedSource::default());

    let handle = watcher.start();
    let mut subscription = watcher.subscribe();

    // Let the initial fetch finish, then drain its events.
    tokio::time::sleep(Duration::from_millis(100)).await;
    while subscription.try_recv().is_some() {}

    watcher.force_refresh();
    let event = tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("refresh produces events before the next tick");
    assert!(event.is_some());

    watcher.stop();
    let _ = handle.await;
}
