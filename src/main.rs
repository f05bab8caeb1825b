mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use vigil::config;
use vigil::infrastructure::{EvmDataSource, PriceOracle};
use vigil::watcher::{Subscription, Watcher};

use crate::app::{App, TxFilter, View};

#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    version,
    about = "Multi-chain EVM balance and transaction watcher"
)]
struct Args {
    /// Test the configuration (RPC reachability, chain ids) and exit
    #[arg(short = 't', long)]
    test: bool,

    /// Output the self-test report as JSON
    #[arg(long)]
    json: bool,

    /// Self-test only: do not write config updates
    #[arg(long)]
    dry_run: bool,

    /// Path to the configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run headless with the HTTP/WebSocket API instead of the TUI
    #[arg(long)]
    server: bool,

    /// API port for --server mode
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

fn main() {
    let args = Args::parse();

    let path = match config::default_path(args.config.as_deref()) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("Error determining config path: {err:#}");
            process::exit(1);
        }
    };
    let cfg = match config::load(&path) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Error loading config from {}: {err:#}", path.display());
            process::exit(1);
        }
    };

    if args.test {
        init_tracing();
        let rt = runtime();
        let code = rt.block_on(vigil::selftest::run(&path, cfg, args.json, args.dry_run));
        process::exit(code);
    }

    if cfg.chains.is_empty() {
        eprintln!("Error: no chains found in configuration.");
        eprintln!(
            "Create {} with a 'chains' list (or a legacy 'rpc_urls' list).",
            path.display()
        );
        process::exit(1);
    }

    let source = Arc::new(EvmDataSource::new(PriceOracle::default()));
    let watcher = Arc::new(Watcher::new(
        &cfg.addresses,
        cfg.chains.clone(),
        cfg.global.clone(),
        source,
    ));

    let result = if args.server {
        init_tracing();
        run_server(watcher, args.port)
    } else {
        run_tui(watcher, cfg.selected_chain)
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("building tokio runtime")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_server(watcher: Arc<Watcher>, port: u16) -> Result<()> {
    let rt = runtime();
    rt.block_on(async move {
        let scheduler = watcher.start();
        let result = vigil::server::serve(Arc::clone(&watcher), port).await;
        watcher.stop();
        let _ = scheduler.await;
        result
    })
}

fn run_tui(watcher: Arc<Watcher>, selected_chain: usize) -> Result<()> {
    // The TUI thread stays synchronous; the watcher runs on the runtime's
    // worker threads and is consumed through a bounded subscription.
    let rt = runtime();
    let guard = rt.enter();
    let scheduler = watcher.start();
    let mut subscription = watcher.subscribe();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(Arc::clone(&watcher), selected_chain);
    let result = run_app(&mut terminal, app, &mut subscription);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    watcher.stop();
    drop(guard);
    let _ = rt.block_on(scheduler);

    result
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    subscription: &mut Subscription,
) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        app.pump_events(subscription);
        terminal.draw(|f| ui::draw(f, &mut app))?;
        if app.should_quit {
            return Ok(());
        }

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let TermEvent::Key(key) = event::read()? {
                handle_key(&mut app, key);
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    app.note_interaction();

    if app.show_help {
        if matches!(key.code, KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Esc) {
            app.show_help = false;
        }
        return;
    }

    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.view {
        View::TxDetail => handle_tx_detail_key(app, key),
        View::Transactions => handle_tx_list_key(app, key),
        View::Summary | View::Network => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => app.view = View::Accounts,
            _ => handle_global_key(app, key),
        },
        View::Accounts => match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            _ => handle_global_key(app, key),
        },
    }
}

fn handle_tx_detail_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc | KeyCode::Backspace => {
            app.view = View::Transactions;
        }
        KeyCode::Char('o') => open_selected_tx(app),
        _ => {}
    }
}

fn handle_tx_list_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.view = View::Accounts,
        KeyCode::Char('i') => {
            app.tx_filter = TxFilter::Incoming;
            app.tx_index = 0;
        }
        KeyCode::Char('o') => {
            app.tx_filter = TxFilter::Outgoing;
            app.tx_index = 0;
        }
        KeyCode::Char('a') => {
            app.tx_filter = TxFilter::All;
            app.tx_index = 0;
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.tx_index = app.tx_index.saturating_sub(1);
        }
        KeyCode::Down | KeyCode::Char('j') => {
            let len = app
                .active_account()
                .map(|acc| app.filtered_transactions(acc).len())
                .unwrap_or(0);
            if app.tx_index + 1 < len {
                app.tx_index += 1;
            }
        }
        KeyCode::Enter => {
            let has_txs = app
                .active_account()
                .map(|acc| !app.filtered_transactions(acc).is_empty())
                .unwrap_or(false);
            if has_txs {
                app.view = View::TxDetail;
            }
        }
        _ => handle_global_key(app, key),
    }
}

fn handle_global_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Char('s') => {
            app.view = if app.view == View::Summary {
                View::Accounts
            } else {
                View::Summary
            };
        }
        KeyCode::Char('t') => {
            app.tx_index = 0;
            app.view = View::Transactions;
        }
        KeyCode::Char('n') => {
            app.view = if app.view == View::Network {
                View::Accounts
            } else {
                View::Network
            };
        }
        KeyCode::Char('r') => app.force_refresh(),
        KeyCode::Char('c') => copy_active_address(app),
        KeyCode::Char('P') => {
            app.privacy = !app.privacy;
            let state = if app.privacy { "enabled" } else { "disabled" };
            app.set_status(format!("Privacy mode {state}"));
        }
        KeyCode::Char('A') => {
            app.auto_cycle = !app.auto_cycle;
            let state = if app.auto_cycle { "enabled" } else { "disabled" };
            app.set_status(format!("Auto-cycle {state}"));
            app.next_auto_cycle = Instant::now()
                + Duration::from_secs(app.global.auto_cycle_interval_seconds.max(1));
        }
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => app.cycle_account(1),
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => app.cycle_account(-1),
        KeyCode::Char('[') => app.cycle_chain(-1),
        KeyCode::Char(']') => app.cycle_chain(1),
        _ => {}
    }
}

fn copy_active_address(app: &mut App) {
    let Some(address) = app.active_account().map(|a| a.address.clone()) else {
        app.set_status("No account selected");
        return;
    };
    match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(address)) {
        Ok(()) => app.set_status("Address copied to clipboard"),
        Err(_) => app.set_status("Clipboard not available"),
    }
}

fn open_selected_tx(app: &mut App) {
    let Some(explorer) = app
        .active_chain()
        .and_then(|c| c.explorer_url.clone())
        .filter(|u| !u.is_empty())
    else {
        app.set_status("Explorer URL not configured for this chain");
        return;
    };
    let Some(hash) = app.active_account().and_then(|account| {
        app.filtered_transactions(account)
            .get(app.tx_index)
            .map(|tx| tx.hash.clone())
    }) else {
        return;
    };

    let url = format!("{}/tx/{hash}", explorer.trim_end_matches('/'));
    match open_browser(&url) {
        Ok(()) => app.set_status("Opened in browser"),
        Err(err) => app.set_status(format!("Failed to open browser: {err}")),
    }
}

fn open_browser(url: &str) -> io::Result<()> {
    let (cmd, args): (&str, Vec<&str>) = if cfg!(target_os = "windows") {
        ("cmd", vec!["/c", "start", url])
    } else if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else {
        ("xdg-open", vec![url])
    };
    process::Command::new(cmd).args(args).spawn().map(|_| ())
}
