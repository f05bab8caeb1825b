//! TUI rendering. Read-only over `App`; all state changes happen in the key
//! handlers.

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use vigil::domain::format;
use vigil::domain::model::TxRecord;
use vigil::watcher::Probe;

use crate::app::{App, View};

const ACCENT: Color = Color::Cyan;
const DIM: Color = Color::DarkGray;
const WARN: Color = Color::Yellow;
const BAD: Color = Color::Red;
const GOOD: Color = Color::Green;

pub fn draw(f: &mut Frame, app: &mut App) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, areas[0], app);
    match app.view {
        View::Accounts => draw_accounts(f, areas[1], app),
        View::Summary => draw_summary(f, areas[1], app),
        View::Transactions | View::TxDetail => draw_transactions(f, areas[1], app),
        View::Network => draw_network(f, areas[1], app),
    }
    draw_footer(f, areas[2], app);

    if app.view == View::TxDetail {
        draw_tx_detail(f, app);
    }
    if app.show_help {
        draw_help(f);
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tabs: Vec<Span> = Vec::new();
    for (i, chain) in app.chains.iter().enumerate() {
        if i > 0 {
            tabs.push(Span::styled(" | ", Style::default().fg(DIM)));
        }
        let style = if i == app.active_chain {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(DIM)
        };
        tabs.push(Span::styled(chain.name.clone(), style));
    }

    let mut status_line = vec![Span::styled(
        " vigil ",
        Style::default().fg(Color::Black).bg(ACCENT),
    )];
    if app.loading {
        status_line.push(Span::styled("  fetching...", Style::default().fg(WARN)));
    }
    if let Some(chain) = app.active_chain() {
        if let Some(wei) = app.gas_prices.get(&chain.name) {
            let arrow = match app.gas_trend {
                Some(std::cmp::Ordering::Greater) => " ^",
                Some(std::cmp::Ordering::Less) => " v",
                _ => "",
            };
            status_line.push(Span::raw(format!(
                "  gas {:.2} gwei{arrow}",
                *wei as f64 / 1e9
            )));
        }
        if let Some(price) = app.prices.get(&chain.price_id) {
            status_line.push(Span::styled(
                format!("  {} ${}", chain.symbol, app.display_fiat(*price)),
                Style::default().fg(GOOD),
            ));
        }
    }
    if let Some(updated) = app.last_update {
        status_line.push(Span::styled(
            format!("  updated {}s ago", updated.elapsed().as_secs()),
            Style::default().fg(DIM),
        ));
    }
    if app.privacy {
        status_line.push(Span::styled("  [privacy]", Style::default().fg(WARN)));
    }
    if app.auto_cycle {
        status_line.push(Span::styled("  [auto]", Style::default().fg(DIM)));
    }

    let header = Paragraph::new(vec![Line::from(status_line), Line::from(tabs)])
        .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, area);
}

fn draw_accounts(f: &mut Frame, area: Rect, app: &App) {
    let Some(account) = app.active_account() else {
        let empty = Paragraph::new("No addresses configured. Add them to the config file.")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(empty, area);
        return;
    };
    let Some(chain) = app.active_chain() else {
        return;
    };

    let mut lines: Vec<Line> = Vec::new();

    let title = match &account.name {
        Some(name) if !name.is_empty() => format!("{name}  ({})", app.display_address(&account.address)),
        _ => app.display_address(&account.address),
    };
    lines.push(Line::from(Span::styled(
        title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::raw(""));

    if let Some(error) = account.errors.get(&chain.name) {
        lines.push(Line::from(Span::styled(
            format!("{}: {}", chain.name, format::truncate(error, 80)),
            Style::default().fg(BAD),
        )));
        lines.push(Line::raw(""));
    }

    match account.balances.get(&chain.name) {
        Some(balance) => {
            let fiat = app
                .prices
                .get(&chain.price_id)
                .filter(|p| **p > 0.0)
                .map(|price| format!("(${})", app.display_fiat(balance.to_f64() * price)))
                .unwrap_or_default();
            lines.push(Line::raw(format!(
                "  {:<8} {:>16} {}",
                chain.symbol,
                app.display_amount(balance, app.global.token_decimals),
                fiat
            )));
            if let Some(previous) = account.balances_24h.get(&chain.name) {
                let delta = balance.to_f64() - previous.to_f64();
                if delta.abs() > f64::EPSILON {
                    let (style, sign) = if delta > 0.0 {
                        (Style::default().fg(GOOD), "+")
                    } else {
                        (Style::default().fg(BAD), "")
                    };
                    lines.push(Line::from(Span::styled(
                        format!("           24h {sign}{delta:.4}"),
                        style,
                    )));
                }
            }
        }
        None => {
            lines.push(Line::from(Span::styled(
                format!("  {:<8} {:>16}", chain.symbol, "..."),
                Style::default().fg(DIM),
            )));
        }
    }

    if let Some(tokens) = account.token_balances.get(&chain.name) {
        for token in &chain.tokens {
            let Some(balance) = tokens.get(&token.symbol) else {
                continue;
            };
            let fiat = app
                .prices
                .get(&token.price_id)
                .filter(|p| **p > 0.0)
                .map(|price| format!("(${})", app.display_fiat(balance.to_f64() * price)))
                .unwrap_or_default();
            lines.push(Line::raw(format!(
                "  {:<8} {:>16} {}",
                token.symbol,
                app.display_amount(balance, app.global.token_decimals),
                fiat
            )));
        }
    }

    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        format!(
            "{} total: ${}   account: ${}   portfolio: ${}",
            chain.name,
            app.display_fiat(app.chain_total(account, chain)),
            app.display_fiat(app.account_total(account)),
            app.display_fiat(app.portfolio_total()),
        ),
        Style::default().fg(ACCENT),
    )));

    let block_title = format!(
        " account {}/{} ",
        app.active_account + 1,
        app.accounts.len()
    );
    let card = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(block_title));
    f.render_widget(card, area);
}

fn draw_summary(f: &mut Frame, area: Rect, app: &App) {
    let mut rows: Vec<(f64, Line)> = Vec::new();
    for (i, account) in app.accounts.iter().enumerate() {
        let total = app.account_total(account);
        let marker = if i == app.active_account { ">" } else { " " };
        let name = account
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format::short_address(&account.address));
        rows.push((
            total,
            Line::raw(format!(
                "{marker} {:<24} {:<14} ${}",
                format::truncate(&name, 24),
                format::short_address(&account.address),
                app.display_fiat(total)
            )),
        ));
    }
    rows.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut lines: Vec<Line> = rows.into_iter().map(|(_, line)| line).collect();
    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        format!("portfolio total: ${}", app.display_fiat(app.portfolio_total())),
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
    )));

    let list = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" summary "));
    f.render_widget(list, area);
}

fn draw_transactions(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(account) = app.active_account() else {
        return;
    };
    let address = account.address.clone();
    let txs: Vec<TxRecord> = app
        .filtered_transactions(account)
        .into_iter()
        .cloned()
        .collect();

    let items: Vec<ListItem> = txs
        .iter()
        .map(|tx| {
            let outgoing = tx.from.eq_ignore_ascii_case(&address);
            let (dir, style) = if outgoing {
                ("out", Style::default().fg(WARN))
            } else {
                ("in ", Style::default().fg(GOOD))
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{dir} "), style),
                Span::raw(format!(
                    "#{:<9} {} -> {} {:>14} {}",
                    tx.block_number,
                    format::short_address(&tx.from),
                    format::truncate(&tx.to, 14),
                    tx.value,
                    tx.gas_price,
                )),
            ]))
        })
        .collect();

    let title = format!(
        " transactions [{}] ({}) ",
        app.tx_filter.label(),
        txs.len()
    );
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));

    if app.tx_index >= txs.len() && !txs.is_empty() {
        app.tx_index = txs.len() - 1;
    }
    let mut state = ListState::default();
    if !txs.is_empty() {
        state.select(Some(app.tx_index));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_tx_detail(f: &mut Frame, app: &App) {
    let Some(account) = app.active_account() else {
        return;
    };
    let txs = app.filtered_transactions(account);
    let Some(tx) = txs.get(app.tx_index) else {
        return;
    };

    let lines = vec![
        Line::raw(format!("hash:      {}", tx.hash)),
        Line::raw(format!("from:      {}", tx.from)),
        Line::raw(format!("to:        {}", tx.to)),
        Line::raw(format!("value:     {}", tx.value)),
        Line::raw(format!("block:     {}", tx.block_number)),
        Line::raw(format!("gas limit: {}", tx.gas_limit)),
        Line::raw(format!("gas price: {}", tx.gas_price)),
        Line::raw(format!("nonce:     {}", tx.nonce)),
        Line::raw(""),
        Line::from(Span::styled(
            "o: open in explorer   esc: back",
            Style::default().fg(DIM),
        )),
    ];

    let area = centered_rect(f.area(), 78, 12);
    f.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" transaction "));
    f.render_widget(popup, area);
}

fn draw_network(f: &mut Frame, area: Rect, app: &App) {
    let Some(chain) = app.active_chain() else {
        return;
    };
    let health = app.watcher.health().snapshot();
    let now = std::time::Instant::now();

    let mut lines: Vec<Line> = Vec::new();
    for url in &chain.rpc_urls {
        let entry = health.get(url);
        let latency = match entry.and_then(|h| h.last) {
            Some(Probe::Latency(d)) => Span::styled(
                format!("{:>6} ms", d.as_millis()),
                Style::default().fg(GOOD),
            ),
            Some(Probe::Failed) => Span::styled("   error", Style::default().fg(BAD)),
            None => Span::styled("       -", Style::default().fg(DIM)),
        };
        let spark = entry
            .map(|h| latency_sparkline(h.history.iter().copied()))
            .unwrap_or_default();
        let cooldown = entry
            .and_then(|h| h.cooldown_remaining(now))
            .map(|d| format!("  cooling {}s", d.as_secs()))
            .unwrap_or_default();

        lines.push(Line::from(vec![
            Span::raw(format!("{:<44} ", format::truncate(url, 43))),
            latency,
            Span::styled(format!("  {spark}"), Style::default().fg(ACCENT)),
            Span::styled(cooldown, Style::default().fg(WARN)),
        ]));
    }
    if !app.gas_history.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::from(vec![
            Span::styled("gas (gwei) ", Style::default().fg(DIM)),
            Span::styled(
                f64_sparkline(app.gas_history.iter().copied()),
                Style::default().fg(ACCENT),
            ),
        ]));
    }

    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" network "));
    f.render_widget(panel, area);
}

fn draw_footer(f: &mut Frame, area: Rect, app: &App) {
    let text = match app.status_message() {
        Some(message) => Line::from(Span::styled(
            format!(" {message}"),
            Style::default().fg(WARN),
        )),
        None => Line::from(Span::styled(
            " q quit  ?: help  tab: account  [ ]: chain  s: summary  t: txs  n: network  r: refresh",
            Style::default().fg(DIM),
        )),
    };
    f.render_widget(Paragraph::new(text), area);
}

fn draw_help(f: &mut Frame) {
    let lines = vec![
        Line::raw("tab / arrows   next / previous account"),
        Line::raw("[ ]            previous / next chain"),
        Line::raw("s              account summary"),
        Line::raw("t              recent transactions (i/o/a filter, enter for detail)"),
        Line::raw("n              network status"),
        Line::raw("c              copy active address"),
        Line::raw("r              force refresh (clears RPC cooldowns)"),
        Line::raw("P              toggle privacy mode"),
        Line::raw("A              toggle account auto-cycle"),
        Line::raw("q / esc        back / quit"),
    ];
    let area = centered_rect(f.area(), 70, 14);
    f.render_widget(Clear, area);
    let popup = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" help "));
    f.render_widget(popup, area);
}

const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render a latency history as bar characters; failures show as `x`.
fn latency_sparkline(history: impl Iterator<Item = Probe>) -> String {
    let probes: Vec<Probe> = history.collect();
    let max = probes
        .iter()
        .filter_map(|p| match p {
            Probe::Latency(d) => Some(d.as_millis()),
            Probe::Failed => None,
        })
        .max()
        .unwrap_or(1)
        .max(1);

    probes
        .iter()
        .map(|probe| match probe {
            Probe::Failed => 'x',
            Probe::Latency(d) => {
                let idx = (d.as_millis() * (SPARK_BARS.len() as u128 - 1)) / max;
                SPARK_BARS[idx as usize]
            }
        })
        .collect()
}

fn f64_sparkline(values: impl Iterator<Item = f64>) -> String {
    let values: Vec<f64> = values.collect();
    let max = values.iter().cloned().fold(f64::MIN, f64::max).max(1e-9);
    values
        .iter()
        .map(|v| {
            let idx = ((v / max) * (SPARK_BARS.len() as f64 - 1.0)).round() as usize;
            SPARK_BARS[idx.min(SPARK_BARS.len() - 1)]
        })
        .collect()
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
