//! TUI application state: what the user is looking at, plus the local copy
//! of the snapshot refreshed from watcher events.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use vigil::config::{ChainConfig, GlobalConfig};
use vigil::domain::format;
use vigil::domain::model::{Account, Amount, TxRecord};
use vigil::watcher::{Event, Subscription, Watcher};

const STATUS_TTL: Duration = Duration::from_secs(2);
/// Gas samples kept for the sparkline (one per fetch, 30 s cadence → ~24 h).
const GAS_HISTORY_CAP: usize = 2880;
/// Auto-cycle holds off while the user is actively interacting.
const AUTO_CYCLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Accounts,
    Summary,
    Transactions,
    TxDetail,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFilter {
    All,
    Incoming,
    Outgoing,
}

impl TxFilter {
    pub fn label(&self) -> &'static str {
        match self {
            TxFilter::All => "all",
            TxFilter::Incoming => "in",
            TxFilter::Outgoing => "out",
        }
    }
}

pub struct App {
    pub watcher: Arc<Watcher>,
    pub chains: Vec<ChainConfig>,
    pub global: GlobalConfig,

    pub accounts: Vec<Account>,
    pub prices: HashMap<String, f64>,
    pub gas_prices: HashMap<String, u128>,
    pub gas_trend: Option<Ordering>,
    pub gas_history: VecDeque<f64>,

    pub active_chain: usize,
    pub active_account: usize,
    pub view: View,
    pub tx_index: usize,
    pub tx_filter: TxFilter,
    pub show_help: bool,

    pub privacy: bool,
    pub auto_cycle: bool,
    pub loading: bool,
    pub should_quit: bool,

    pub last_update: Option<Instant>,
    pub last_interaction: Instant,
    pub next_auto_cycle: Instant,
    status: Option<(String, Instant)>,
}

impl App {
    pub fn new(watcher: Arc<Watcher>, selected_chain: usize) -> Self {
        let chains = watcher.chains().to_vec();
        let global = watcher.global().clone();
        let accounts = watcher.get_accounts();
        let now = Instant::now();
        let auto_cycle = global.auto_cycle_enabled;
        let cycle_interval = Duration::from_secs(global.auto_cycle_interval_seconds.max(1));

        Self {
            watcher,
            chains,
            global,
            accounts,
            prices: HashMap::new(),
            gas_prices: HashMap::new(),
            gas_trend: None,
            gas_history: VecDeque::new(),
            active_chain: selected_chain,
            active_account: 0,
            view: View::Accounts,
            tx_index: 0,
            tx_filter: TxFilter::All,
            show_help: false,
            privacy: false,
            auto_cycle,
            loading: true,
            should_quit: false,
            last_update: None,
            last_interaction: now,
            next_auto_cycle: now + cycle_interval,
            status: None,
        }
    }

    /// Drain pending watcher events and fold them into local state.
    pub fn pump_events(&mut self, subscription: &mut Subscription) {
        while let Some(event) = subscription.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: Event) {
        match event {
            Event::PriceUpdated(data) => {
                self.prices.insert(data.coin_id, data.usd);
            }
            Event::ChainDataUpdated(_) => {
                self.loading = false;
                self.accounts = self.watcher.get_accounts();
            }
            Event::TransactionsUpdated { .. } => {
                self.accounts = self.watcher.get_accounts();
            }
            Event::GasPriceUpdated { chain_name, wei } => {
                if let Some(previous) = self.gas_prices.get(&chain_name) {
                    self.gas_trend = Some(wei.cmp(previous));
                }
                let is_active = self
                    .chains
                    .get(self.active_chain)
                    .map(|c| c.name == chain_name)
                    .unwrap_or(false);
                if is_active {
                    self.gas_history.push_back(wei as f64 / 1e9);
                    while self.gas_history.len() > GAS_HISTORY_CAP {
                        self.gas_history.pop_front();
                    }
                }
                self.gas_prices.insert(chain_name, wei);
            }
            Event::StatusUpdated => {}
        }
        self.last_update = Some(Instant::now());
    }

    /// Once-a-frame housekeeping: status expiry, privacy timeout, auto-cycle.
    pub fn on_tick(&mut self) {
        let now = Instant::now();

        if let Some((_, since)) = &self.status {
            if now.duration_since(*since) >= STATUS_TTL {
                self.status = None;
            }
        }

        if !self.privacy && self.global.privacy_timeout_seconds > 0 {
            let timeout = Duration::from_secs(self.global.privacy_timeout_seconds);
            if now.duration_since(self.last_interaction) >= timeout {
                self.privacy = true;
                self.set_status("Privacy mode enabled due to inactivity");
            }
        }

        if self.auto_cycle && self.global.auto_cycle_interval_seconds > 0 && now >= self.next_auto_cycle
        {
            if now.duration_since(self.last_interaction) >= AUTO_CYCLE_GRACE {
                self.cycle_account(1);
                self.next_auto_cycle =
                    now + Duration::from_secs(self.global.auto_cycle_interval_seconds);
            } else {
                self.next_auto_cycle = now + Duration::from_secs(1);
            }
        }
    }

    pub fn note_interaction(&mut self) {
        self.last_interaction = Instant::now();
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status.as_ref().map(|(m, _)| m.as_str())
    }

    pub fn active_chain(&self) -> Option<&ChainConfig> {
        self.chains.get(self.active_chain)
    }

    pub fn active_account(&self) -> Option<&Account> {
        self.accounts.get(self.active_account)
    }

    pub fn cycle_account(&mut self, step: isize) {
        if self.accounts.is_empty() {
            return;
        }
        let len = self.accounts.len() as isize;
        let next = (self.active_account as isize + step).rem_euclid(len);
        self.active_account = next as usize;
        self.tx_index = 0;
    }

    pub fn cycle_chain(&mut self, step: isize) {
        if self.chains.is_empty() {
            return;
        }
        let len = self.chains.len() as isize;
        let next = (self.active_chain as isize + step).rem_euclid(len);
        self.active_chain = next as usize;
        self.gas_history.clear();
    }

    pub fn force_refresh(&mut self) {
        self.loading = true;
        self.watcher.force_refresh();
        self.set_status("Refreshing data...");
    }

    // --- valuation ---

    fn price_of(&self, price_id: &str) -> Option<f64> {
        self.prices.get(price_id).copied().filter(|p| *p > 0.0)
    }

    /// Fiat value of one account across every chain.
    pub fn account_total(&self, account: &Account) -> f64 {
        let mut total = 0.0;
        for chain in &self.chains {
            if let (Some(balance), Some(price)) =
                (account.balances.get(&chain.name), self.price_of(&chain.price_id))
            {
                total += balance.to_f64() * price;
            }
            if let Some(tokens) = account.token_balances.get(&chain.name) {
                for token in &chain.tokens {
                    if let (Some(balance), Some(price)) =
                        (tokens.get(&token.symbol), self.price_of(&token.price_id))
                    {
                        total += balance.to_f64() * price;
                    }
                }
            }
        }
        total
    }

    pub fn portfolio_total(&self) -> f64 {
        self.accounts.iter().map(|a| self.account_total(a)).sum()
    }

    /// Fiat value of the active chain's holdings for one account.
    pub fn chain_total(&self, account: &Account, chain: &ChainConfig) -> f64 {
        let mut total = 0.0;
        if let (Some(balance), Some(price)) =
            (account.balances.get(&chain.name), self.price_of(&chain.price_id))
        {
            total += balance.to_f64() * price;
        }
        if let Some(tokens) = account.token_balances.get(&chain.name) {
            for token in &chain.tokens {
                if let (Some(balance), Some(price)) =
                    (tokens.get(&token.symbol), self.price_of(&token.price_id))
                {
                    total += balance.to_f64() * price;
                }
            }
        }
        total
    }

    pub fn filtered_transactions<'a>(&self, account: &'a Account) -> Vec<&'a TxRecord> {
        account
            .transactions
            .iter()
            .filter(|tx| {
                let outgoing = tx.from.eq_ignore_ascii_case(&account.address);
                match self.tx_filter {
                    TxFilter::All => true,
                    TxFilter::Incoming => !outgoing,
                    TxFilter::Outgoing => outgoing,
                }
            })
            .collect()
    }

    // --- privacy-aware rendering ---

    pub fn display_amount(&self, amount: &Amount, decimals: usize) -> String {
        let rendered = format::group_thousands(&amount.format(decimals));
        if self.privacy {
            format::mask(&rendered)
        } else {
            rendered
        }
    }

    pub fn display_fiat(&self, value: f64) -> String {
        let rendered = format::format_float(value, self.global.fiat_decimals);
        if self.privacy {
            format::mask(&rendered)
        } else {
            rendered
        }
    }

    pub fn display_address(&self, address: &str) -> String {
        if self.privacy {
            format::mask_address(address)
        } else {
            address.to_string()
        }
    }
}
