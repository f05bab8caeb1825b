//! The watcher core: a thread-safe snapshot of every observation, an event
//! bus fanning updates out to subscribers, and the polling scheduler that
//! drives all fetches on a fixed cadence.
//!
//! Consumers (the TUI, the API server) only ever call `subscribe`,
//! `unsubscribe`, and the read accessors; the watcher never calls back into
//! them.

pub mod events;
pub mod health;
pub mod source;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{AddressConfig, ChainConfig, GlobalConfig};
use crate::domain::model::{Account, ChainData, TxRecord};

pub use events::{Event, Subscription, SUBSCRIBER_CAPACITY};
pub use health::{Probe, RpcHealth, UrlHealth};
pub use source::DataSource;

/// Full-fetch cadence. If a fetch overruns the interval the next one starts
/// as soon as the previous completes; full fetches never overlap.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Recent transactions kept per address.
pub const MAX_RECENT_TRANSACTIONS: usize = 5;

/// The shared mutable state, guarded as a whole by one reader/writer lock.
/// It is small and refreshed every thirty seconds; sharding would buy
/// nothing.
#[derive(Default)]
struct Snapshot {
    accounts: Vec<Account>,
    /// price id -> USD
    prices: HashMap<String, f64>,
    /// chain name -> wei
    gas_prices: HashMap<String, u128>,
}

pub struct Watcher {
    chains: Vec<ChainConfig>,
    global: GlobalConfig,
    source: Arc<dyn DataSource>,
    snapshot: RwLock<Snapshot>,
    health: RpcHealth,
    subscribers: Mutex<Vec<(u64, mpsc::Sender<Event>)>>,
    next_subscriber: AtomicU64,
    refresh: Notify,
    stop: watch::Sender<bool>,
}

impl Watcher {
    pub fn new(
        addresses: &[AddressConfig],
        chains: Vec<ChainConfig>,
        global: GlobalConfig,
        source: Arc<dyn DataSource>,
    ) -> Self {
        let accounts = addresses
            .iter()
            .filter(|a| !a.address.trim().is_empty())
            .map(|a| Account::new(a.address.trim().to_string(), a.name.clone()))
            .collect();

        let (stop, _) = watch::channel(false);
        Self {
            chains,
            global,
            source,
            snapshot: RwLock::new(Snapshot {
                accounts,
                ..Snapshot::default()
            }),
            health: RpcHealth::new(),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            refresh: Notify::new(),
            stop,
        }
    }

    pub fn chains(&self) -> &[ChainConfig] {
        &self.chains
    }

    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn health(&self) -> &RpcHealth {
        &self.health
    }

    // --- event bus ---

    /// Register a subscriber and hand back its bounded sink.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().expect("subscriber lock").push((id, tx));
        Subscription { id, rx }
    }

    /// Detach and close a subscriber.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut subs = self.subscribers.lock().expect("subscriber lock");
        subs.retain(|(id, _)| *id != subscription.id);
        // Dropping `subscription.rx` closes the channel.
    }

    /// Send `event` to every subscriber without blocking: a full sink drops
    /// this event for that subscriber only.
    pub fn publish(&self, event: Event) {
        let mut subs = self.subscribers.lock().expect("subscriber lock");
        subs.retain(|(_, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
    }

    // --- snapshot reads ---

    pub fn get_accounts(&self) -> Vec<Account> {
        self.snapshot.read().expect("snapshot lock").accounts.clone()
    }

    pub fn get_prices(&self) -> HashMap<String, f64> {
        self.snapshot.read().expect("snapshot lock").prices.clone()
    }

    pub fn get_gas_prices(&self) -> HashMap<String, u128> {
        self.snapshot.read().expect("snapshot lock").gas_prices.clone()
    }

    // --- snapshot writes ---

    /// Merge a bulk-fetch result. Each result overwrites the address's
    /// native, 24h, and token balances for that chain and clears its error
    /// entry. The lock is held for the whole merge; partial chain state is
    /// never observable.
    pub fn merge_chain_data(&self, data: &ChainData) {
        let mut snap = self.snapshot.write().expect("snapshot lock");
        for result in &data.results {
            let Some(account) = snap.accounts.iter_mut().find(|a| a.matches(&result.address))
            else {
                continue;
            };
            account
                .balances
                .insert(data.chain_name.clone(), result.balance);
            match result.balance_24h {
                Some(balance) => {
                    account.balances_24h.insert(data.chain_name.clone(), balance);
                }
                None => {
                    account.balances_24h.remove(&data.chain_name);
                }
            }
            account
                .token_balances
                .insert(data.chain_name.clone(), result.token_balances.clone());
            account.errors.remove(&data.chain_name);
        }
    }

    /// Record a chain-level failure, but only on accounts that have never
    /// had a successful balance for that chain. Good data is not flashed
    /// over by a transient error.
    pub fn set_chain_error(&self, chain_name: &str, error: &str) {
        let mut snap = self.snapshot.write().expect("snapshot lock");
        for account in &mut snap.accounts {
            if !account.balances.contains_key(chain_name) {
                account
                    .errors
                    .insert(chain_name.to_string(), error.to_string());
            }
        }
    }

    pub fn set_transactions(&self, address: &str, mut transactions: Vec<TxRecord>) {
        transactions.truncate(MAX_RECENT_TRANSACTIONS);
        let mut snap = self.snapshot.write().expect("snapshot lock");
        if let Some(account) = snap.accounts.iter_mut().find(|a| a.matches(address)) {
            account.transactions = transactions;
        }
    }

    pub fn set_gas_price(&self, chain_name: &str, wei: u128) {
        self.snapshot
            .write()
            .expect("snapshot lock")
            .gas_prices
            .insert(chain_name.to_string(), wei);
    }

    pub fn set_price(&self, coin_id: &str, usd: f64) {
        self.snapshot
            .write()
            .expect("snapshot lock")
            .prices
            .insert(coin_id.to_string(), usd);
    }

    // --- scheduling ---

    /// Operator command: drop every cooldown and start a full fetch now.
    pub fn force_refresh(&self) {
        self.health.clear_cooldowns();
        self.refresh.notify_one();
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Run the polling loop: one full fetch immediately, then one per tick,
    /// force-refresh, or until stopped. Returns the scheduler task handle.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut stop_rx = watcher.stop.subscribe();
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.tick().await; // the interval's immediate first tick

            watcher.fetch_all().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = watcher.refresh.notified() => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                watcher.fetch_all().await;
            }
            debug!("watcher scheduler stopped");
        })
    }

    /// One tick: launch every fetch concurrently, join them all, then
    /// return. Each task writes its result to the snapshot and publishes
    /// exactly one event; failed tasks publish nothing.
    pub async fn fetch_all(self: &Arc<Self>) {
        let addresses: Vec<String> = {
            let snap = self.snapshot.read().expect("snapshot lock");
            snap.accounts.iter().map(|a| a.address.clone()).collect()
        };

        let mut coin_ids = BTreeSet::new();
        for chain in &self.chains {
            if !chain.price_id.is_empty() {
                coin_ids.insert(chain.price_id.clone());
            }
            for token in &chain.tokens {
                if !token.price_id.is_empty() {
                    coin_ids.insert(token.price_id.clone());
                }
            }
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        for coin_id in coin_ids {
            let watcher = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                watcher.fetch_price_task(coin_id).await;
            }));
        }

        for chain in self.chains.clone() {
            let watcher = Arc::clone(self);
            let chain_addresses = addresses.clone();
            tasks.push(tokio::spawn({
                let chain = chain.clone();
                async move {
                    watcher.fetch_chain_task(chain, chain_addresses).await;
                }
            }));

            let watcher = Arc::clone(self);
            tasks.push(tokio::spawn({
                let chain = chain.clone();
                async move {
                    watcher.fetch_gas_task(chain).await;
                }
            }));

            for address in &addresses {
                let watcher = Arc::clone(self);
                let chain = chain.clone();
                let address = address.clone();
                tasks.push(tokio::spawn(async move {
                    watcher.fetch_transactions_task(chain, address).await;
                }));
            }

            for url in &chain.rpc_urls {
                let watcher = Arc::clone(self);
                let url = url.clone();
                tasks.push(tokio::spawn(async move {
                    watcher.probe_task(url).await;
                }));
            }
        }

        futures::future::join_all(tasks).await;
    }

    async fn fetch_price_task(&self, coin_id: String) {
        match self.source.fetch_price(&coin_id).await {
            Ok(data) => {
                self.set_price(&data.coin_id, data.usd);
                self.publish(Event::PriceUpdated(data));
            }
            Err(err) => debug!(coin_id, error = %err, "price fetch failed"),
        }
    }

    async fn fetch_chain_task(&self, chain: ChainConfig, addresses: Vec<String>) {
        let mut prioritized = chain.clone();
        prioritized.rpc_urls = self.health.prioritized(&chain.rpc_urls);

        match self.source.fetch_chain_data(&prioritized, &addresses).await {
            Ok(data) => {
                if !data.failed_urls.is_empty() {
                    self.health.mark_failed(&data.failed_urls);
                }
                self.merge_chain_data(&data);
                if let Some(error) = &data.error {
                    warn!(chain = %data.chain_name, error = %error, "chain fetch incomplete");
                    self.set_chain_error(&data.chain_name, error);
                }
                self.publish(Event::ChainDataUpdated(data));
            }
            Err(err) => warn!(chain = %chain.name, error = %err, "chain fetch failed"),
        }
    }

    async fn fetch_gas_task(&self, chain: ChainConfig) {
        let urls = self.health.prioritized(&chain.rpc_urls);
        match self.source.fetch_gas_price(&urls).await {
            Ok(data) => {
                if !data.failed_urls.is_empty() {
                    self.health.mark_failed(&data.failed_urls);
                }
                self.set_gas_price(&chain.name, data.wei);
                self.publish(Event::GasPriceUpdated {
                    chain_name: chain.name,
                    wei: data.wei,
                });
            }
            Err(err) => debug!(chain = %chain.name, error = %err, "gas price fetch failed"),
        }
    }

    async fn fetch_transactions_task(&self, chain: ChainConfig, address: String) {
        let urls = self.health.prioritized(&chain.rpc_urls);
        match self
            .source
            .fetch_transactions(&address, &urls, self.global.token_decimals)
            .await
        {
            Ok((transactions, failed_urls)) => {
                if !failed_urls.is_empty() {
                    self.health.mark_failed(&failed_urls);
                }
                self.set_transactions(&address, transactions.clone());
                self.publish(Event::TransactionsUpdated {
                    address,
                    transactions,
                });
            }
            Err(err) => {
                debug!(chain = %chain.name, address, error = %err, "transaction scan failed")
            }
        }
    }

    async fn probe_task(&self, url: String) {
        let probe = match self.source.probe_latency(&url).await {
            Ok(elapsed) => Probe::Latency(elapsed),
            Err(_) => Probe::Failed,
        };
        self.health.record_probe(&url, probe);
    }
}
