//! Trading engine
//!
//! Owns every piece of loop state (active universe, regime snapshot,
//! scanner states, positions, risk counters, sell cooldowns) and advances it
//! one tick at a time. Each tick runs sequentially:
//!
//! 1. Refresh the universe and the regime when due
//! 2. Fetch 3m candles once per active symbol, scan them, evaluate strategies
//! 3. Route BUY signals through cooldown, risk gate, sizing and execution
//! 4. Exit checks on held positions, then high-water mark updates
//!
//! Nothing in a tick fails: missing data or a rejected order only skips the
//! affected symbol until the next tick.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::{Config, TradingConfig, TradingMode};
use crate::exchange::{Exchange, Timeframe};
use crate::ledger::{ledger_path, TradeLedger, TradeRecord};
use crate::notifier::TelegramNotifier;
use crate::regime::{RegimeAnalyzer, RegimeSnapshot};
use crate::risk::RiskManager;
use crate::scanner::{ScanStatus, VolumeScanner};
use crate::strategies::{create_strategies, SignalInput, Strategy};
use crate::trader::{EntryContext, Trader};
use crate::universe::{merge_symbols, UniverseSelector};
use crate::{Position, Signal, SignalAction, StrategyKind, Symbol};

/// Exit decision for one held position at `price`.
///
/// The hard stop is checked first for every strategy. Breakout positions
/// then trail their high-water mark, all others take a fixed profit. A
/// non-positive price never triggers an exit.
pub fn check_exit(position: &Position, price: f64, config: &TradingConfig) -> Option<Signal> {
    if !(price > 0.0) {
        return None;
    }
    let pnl = position.pnl_pct(price);
    let symbol = position.symbol.clone();

    if pnl < -config.hard_stop_pct {
        return Some(Signal::exit(
            SignalAction::StopLoss,
            symbol,
            price,
            format!("Hard SL ({:+.2}%)", pnl * 100.0),
        ));
    }

    if position.strategy.uses_trailing_stop() {
        let trail = position.highest_price * (1.0 - config.trailing_stop_pct);
        if price < trail {
            return Some(Signal::exit(
                SignalAction::TakeProfit,
                symbol,
                price,
                format!(
                    "Trailing Stop (High {}, {:+.2}%)",
                    position.highest_price,
                    pnl * 100.0
                ),
            ));
        }
    } else if pnl > config.take_profit_pct {
        return Some(Signal::exit(
            SignalAction::TakeProfit,
            symbol,
            price,
            format!("Fixed TP ({:+.2}%)", pnl * 100.0),
        ));
    }
    None
}

/// What one tick did
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub entries: Vec<Symbol>,
    pub exits: Vec<TradeRecord>,
    /// Buy signals rejected by cooldown or the risk gate
    pub blocked: usize,
}

pub struct TradingEngine<E: Exchange> {
    config: Config,
    exchange: E,
    clock: SharedClock,
    timezone: Tz,
    universe: UniverseSelector,
    regime_analyzer: RegimeAnalyzer,
    scanner: VolumeScanner,
    strategies: Vec<Strategy>,
    trader: Trader,
    active_symbols: Vec<Symbol>,
    regime: RegimeSnapshot,
    last_universe_refresh: Option<DateTime<Utc>>,
    last_regime_refresh: Option<DateTime<Utc>>,
    last_sell_times: HashMap<Symbol, DateTime<Utc>>,
    tick_count: u64,
}

impl<E: Exchange> TradingEngine<E> {
    pub fn new(config: Config, exchange: E, clock: SharedClock, run_id: Option<&str>) -> Result<Self> {
        let timezone = config.trading.timezone()?;

        let risk = RiskManager::new(config.risk.clone(), clock.clone(), timezone);
        let mut trader = Trader::new(config.trading.clone(), risk, clock.clone(), timezone);

        if config.ledger.enabled {
            let date = config.trading.trading_date(clock.now())?;
            let path = ledger_path(&config.ledger.dir, run_id, &date);
            info!("Trade ledger: {}", path.display());
            trader = trader.with_ledger(TradeLedger::new(path));
        }
        if config.notifier.is_configured() {
            let notifier = TelegramNotifier::new(config.notifier.clone())
                .context("Failed to initialise Telegram notifier")?;
            trader = trader.with_notifier(notifier);
        }

        let strategies = create_strategies(&config.strategies, timezone);
        info!(
            "Strategies: {}",
            strategies.iter().map(|s| s.name()).join(", ")
        );

        Ok(Self {
            universe: UniverseSelector::new(config.universe.clone()),
            regime_analyzer: RegimeAnalyzer::new(config.regime.clone()),
            scanner: VolumeScanner::new(config.scanner.clone(), clock.clone()),
            strategies,
            trader,
            active_symbols: Vec::new(),
            regime: RegimeSnapshot::flat(),
            last_universe_refresh: None,
            last_regime_refresh: None,
            last_sell_times: HashMap::new(),
            tick_count: 0,
            config,
            exchange,
            clock,
            timezone,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn trader(&self) -> &Trader {
        &self.trader
    }

    pub fn trader_mut(&mut self) -> &mut Trader {
        &mut self.trader
    }

    pub fn scanner(&self) -> &VolumeScanner {
        &self.scanner
    }

    pub fn regime(&self) -> RegimeSnapshot {
        self.regime
    }

    pub fn active_symbols(&self) -> &[Symbol] {
        &self.active_symbols
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_sell_time(&self, symbol: &Symbol) -> Option<DateTime<Utc>> {
        self.last_sell_times.get(symbol).copied()
    }

    /// Pin the active set until the next scheduled universe refresh
    pub fn set_universe(&mut self, symbols: Vec<Symbol>) {
        self.scanner.retain_symbols(&symbols);
        self.active_symbols = symbols;
        self.last_universe_refresh = Some(self.clock.now());
    }

    fn is_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, every_minutes: i64) -> bool {
        match last {
            Some(t) => now - t > Duration::minutes(every_minutes),
            None => true,
        }
    }

    async fn refresh_universe(&mut self, now: DateTime<Utc>) {
        if !self.active_symbols.is_empty()
            && !Self::is_due(
                self.last_universe_refresh,
                now,
                self.config.trading.universe_refresh_minutes,
            )
        {
            return;
        }

        info!("Updating universe...");
        let limit = self.config.universe.limit;
        let mut symbols = self
            .universe
            .get_top_movers(&self.exchange, now, limit)
            .await;

        let weekly = self.config.universe.weekly_gainers;
        if weekly > 0 {
            let gainers: Vec<Symbol> = self
                .universe
                .get_weekly_gainers(&self.exchange, now, weekly)
                .await
                .into_iter()
                .map(|g| g.symbol)
                .collect();
            symbols = merge_symbols(&symbols, &gainers);
        }

        self.scanner.retain_symbols(&symbols);
        info!("Hot symbols: [{}]", symbols.iter().join(", "));
        self.active_symbols = symbols;
        self.last_universe_refresh = Some(now);
    }

    async fn refresh_regime(&mut self, now: DateTime<Utc>) {
        if !Self::is_due(
            self.last_regime_refresh,
            now,
            self.config.trading.regime_refresh_minutes,
        ) {
            return;
        }
        self.regime = self.regime_analyzer.analyze(&self.exchange, now).await;
        self.last_regime_refresh = Some(now);
    }

    /// Scan every active symbol and collect BUY signals from all strategies
    async fn collect_signals(&mut self, now: DateTime<Utc>) -> Vec<(Signal, StrategyKind)> {
        let start = now - Duration::minutes(self.scanner.config().lookback_minutes);
        let regime = self.regime.regime;
        let symbols = self.active_symbols.clone();

        let mut signals = Vec::new();
        for symbol in &symbols {
            let candles = self
                .exchange
                .fetch_candles(symbol, Timeframe::Minute3, start, now)
                .await;
            let status = self.scanner.scan_candles(symbol, &candles);
            if status != ScanStatus::Normal {
                debug!("{} scanner: {}", symbol, status);
            }

            let input = SignalInput::new(symbol, regime, status, now).with_short_candles(&candles);
            for strategy in &self.strategies {
                if let Some(signal) = strategy.check_signal(&input, &self.exchange).await {
                    if signal.action != SignalAction::Buy {
                        continue;
                    }
                    info!(
                        "Signal: BUY {} via {} ({})",
                        symbol,
                        strategy.name(),
                        signal.reason
                    );
                    signals.push((signal, strategy.kind()));
                }
            }
        }
        signals
    }

    /// Cooldown, risk gate, then sizing and execution.
    ///
    /// `None` when the signal was blocked, otherwise whether a position opened.
    async fn handle_entry(
        &mut self,
        signal: &Signal,
        strategy: StrategyKind,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        let symbol = &signal.symbol;
        let cooldown = Duration::minutes(self.config.trading.sell_cooldown_minutes);
        if let Some(last_sell) = self.last_sell_times.get(symbol) {
            if now - *last_sell < cooldown {
                info!(
                    "Signal blocked: cooldown for {} (last sell {})",
                    symbol,
                    last_sell.with_timezone(&self.timezone).format("%H:%M")
                );
                return None;
            }
        }

        let regime = self.regime.regime;
        if !self.trader.risk_mut().check_entry_allowed(regime, strategy) {
            return None;
        }

        let ctx = EntryContext {
            strategy,
            regime,
            regime_factor: self.regime.factor,
            tier: self.config.trading.tier_for(symbol),
        };
        Some(self.trader.enter(&self.exchange, signal, ctx).await)
    }

    /// Exit checks for held positions, then high-water mark updates
    async fn manage_positions(&mut self, now: DateTime<Utc>) -> Vec<TradeRecord> {
        let held: Vec<Symbol> = self.trader.positions().keys().cloned().sorted().collect();
        let mut prices = HashMap::with_capacity(held.len());
        let mut closed = Vec::new();

        for symbol in held {
            let price = self.exchange.get_current_price(&symbol).await;
            if !(price > 0.0) {
                warn!("No price for {}, skipping exit checks", symbol);
                continue;
            }
            prices.insert(symbol.clone(), price);

            let exit = self
                .trader
                .position(&symbol)
                .and_then(|p| check_exit(p, price, &self.config.trading));
            if let Some(signal) = exit {
                info!("Exit signal for {}: {}", symbol, signal.reason);
                if let Some(record) = self.trader.exit(&self.exchange, &signal).await {
                    self.last_sell_times.insert(symbol, now);
                    closed.push(record);
                }
            }
        }

        self.trader.update_positions(&prices);
        closed
    }

    /// Run one loop iteration
    pub async fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        self.tick_count += 1;

        self.refresh_universe(now).await;
        self.refresh_regime(now).await;

        let mut outcome = TickOutcome::default();
        let signals = self.collect_signals(now).await;
        for (signal, strategy) in &signals {
            match self.handle_entry(signal, *strategy, now).await {
                Some(true) => outcome.entries.push(signal.symbol.clone()),
                Some(false) => {}
                None => outcome.blocked += 1,
            }
        }

        outcome.exits = self.manage_positions(now).await;
        self.heartbeat(now);
        outcome
    }

    fn heartbeat(&self, now: DateTime<Utc>) {
        let local = now.with_timezone(&self.timezone).format("%Y-%m-%d %H:%M:%S");
        match self.trader.mode() {
            TradingMode::Paper => info!(
                "[VOLT-X] {} | Regime: {} | Positions: {} | Hot: {} | Cash: {:.0}",
                local,
                self.regime.regime,
                self.trader.positions().len(),
                self.active_symbols.len(),
                self.trader.paper_balance().to_f64()
            ),
            TradingMode::Live => info!(
                "[VOLT-X] {} | Regime: {} | Positions: {} | Hot: {}",
                local,
                self.regime.regime,
                self.trader.positions().len(),
                self.active_symbols.len()
            ),
        }
    }
}
