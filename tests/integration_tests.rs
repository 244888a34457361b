//! Integration tests for the VOLT-X trading loop
//!
//! These tests drive the engine and the trader against an in-memory exchange
//! and a manual clock.

use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use voltx::config::{TradingConfig, TradingMode};
use voltx::exchange::{OrderAck, Ticker};
use voltx::ledger::read_ledger;
use voltx::regime::RegimeConfig;
use voltx::report::PerformanceReport;
use voltx::risk::{RiskConfig, RiskManager};
use voltx::trader::{EntryContext, Trader};
use voltx::{
    check_exit, Candle, Clock, Config, Exchange, ExchangeError, ManualClock, OrderRequest, RegimeType,
    SharedClock, Signal, SignalAction, StrategyKind, Symbol, Tier, Timeframe, TradingEngine,
};

// =============================================================================
// Test Utilities
// =============================================================================

/// In-memory exchange. Candle series are returned as stored, whatever the window.
#[derive(Default)]
struct MockExchange {
    candles: Mutex<HashMap<(Symbol, Timeframe), Vec<Candle>>>,
    fetches: Mutex<HashMap<(Symbol, Timeframe), usize>>,
    markets: Mutex<Vec<Symbol>>,
    tickers: Mutex<Vec<Ticker>>,
    prices: Mutex<HashMap<Symbol, f64>>,
    orders: Mutex<Vec<OrderRequest>>,
    fail_orders: AtomicBool,
    balance: f64,
}

impl MockExchange {
    fn with_balance(balance: f64) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    fn set_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.candles
            .lock()
            .unwrap()
            .insert((Symbol::new(symbol), timeframe), candles);
    }

    fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(Symbol::new(symbol), price);
    }

    /// Lists a market with its 24h traded value
    fn add_market(&self, symbol: &str, turnover_24h: f64) {
        self.markets.lock().unwrap().push(Symbol::new(symbol));
        self.tickers.lock().unwrap().push(Ticker {
            symbol: Symbol::new(symbol),
            trade_price: 1000.0,
            acc_trade_price_24h: turnover_24h,
            signed_change_rate: 0.0,
        });
    }

    fn fetch_count(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&(Symbol::new(symbol), timeframe))
            .copied()
            .unwrap_or(0)
    }

    fn orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Vec<Candle> {
        *self
            .fetches
            .lock()
            .unwrap()
            .entry((symbol.clone(), timeframe))
            .or_insert(0) += 1;
        self.candles
            .lock()
            .unwrap()
            .get(&(symbol.clone(), timeframe))
            .cloned()
            .unwrap_or_default()
    }

    async fn get_current_price(&self, symbol: &Symbol) -> f64 {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(0.0)
    }

    async fn get_balance(&self) -> f64 {
        self.balance
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ExchangeError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(ExchangeError::Api {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.orders.lock().unwrap().push(order.clone());
        Ok(OrderAck {
            uuid: format!("order-{}", self.orders.lock().unwrap().len()),
            market: order.symbol().to_string(),
            side: order.side().as_str().to_string(),
            state: "wait".to_string(),
        })
    }

    async fn quote_markets(&self) -> Vec<Symbol> {
        self.markets.lock().unwrap().clone()
    }

    async fn tickers(&self, symbols: &[Symbol]) -> Vec<Ticker> {
        self.tickers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| symbols.contains(&t.symbol))
            .cloned()
            .collect()
    }
}

/// 19:00 KST, outside the morning window
fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
}

/// Slow 3m uptrend, three sharp red candles, then a green hammer at the lower band.
/// Reads as a FLAT-regime dip with constant volume.
fn dip_candles() -> Vec<Candle> {
    let start = start_time() - Duration::minutes(3 * 84);
    let mut rows: Vec<(f64, f64, f64, f64)> = (0..80)
        .map(|i| {
            let close = 100.0 + 0.5 * i as f64;
            (close - 0.5, close + 0.2, close - 0.7, close)
        })
        .collect();
    for _ in 0..3 {
        let open = rows[rows.len() - 1].3;
        let close = open - 3.0;
        rows.push((open, open + 0.1, close - 0.1, close));
    }
    rows.push((130.0, 131.1, 128.0, 131.0));

    rows.into_iter()
        .enumerate()
        .map(|(i, (o, h, l, c))| {
            Candle::new(start + Duration::minutes(3 * i as i64), o, h, l, c, 100.0).unwrap()
        })
        .collect()
}

/// 30 hourly closes on a rising line with an alternating `swing` on odd hours
fn hourly_candles(base: f64, slope: f64, swing: f64) -> Vec<Candle> {
    let start = start_time() - Duration::hours(30);
    (0..30)
        .map(|i| {
            let close = base + slope * i as f64 + if i % 2 == 1 { swing } else { 0.0 };
            Candle::new_unchecked(start + Duration::hours(i), close, close, close, close, 1.0)
        })
        .collect()
}

fn weekly_candle(open: f64, close: f64, volume: f64) -> Vec<Candle> {
    let high = open.max(close);
    let low = open.min(close);
    vec![Candle::new_unchecked(
        start_time() - Duration::days(3),
        open,
        high,
        low,
        close,
        volume,
    )]
}

/// Five listed markets:
/// - KRW-AAA: liquid and swinging hard
/// - KRW-BBB: most liquid, calmer
/// - KRW-DOWN: liquid but trending down
/// - KRW-DOGE: under the 24h turnover floor, best weekly gain
/// - KRW-BTT: blacklisted
fn universe_exchange() -> MockExchange {
    let exchange = MockExchange::default();
    exchange.add_market("KRW-AAA", 20e9);
    exchange.add_market("KRW-BBB", 30e9);
    exchange.add_market("KRW-DOWN", 25e9);
    exchange.add_market("KRW-DOGE", 5e9);
    exchange.add_market("KRW-BTT", 50e9);

    exchange.set_candles("KRW-AAA", Timeframe::Hour1, hourly_candles(100.0, 0.1, 2.0));
    exchange.set_candles("KRW-BBB", Timeframe::Hour1, hourly_candles(100.0, 0.1, 0.5));
    exchange.set_candles("KRW-DOWN", Timeframe::Hour1, hourly_candles(200.0, -1.0, 0.5));
    exchange.set_candles("KRW-DOGE", Timeframe::Hour1, hourly_candles(100.0, 0.1, 3.0));
    exchange.set_candles("KRW-BTT", Timeframe::Hour1, hourly_candles(100.0, 0.1, 5.0));

    exchange.set_candles("KRW-AAA", Timeframe::Week, weekly_candle(100.0, 105.0, 1e7));
    exchange.set_candles("KRW-BBB", Timeframe::Week, weekly_candle(100.0, 103.0, 1e7));
    exchange.set_candles("KRW-DOWN", Timeframe::Week, weekly_candle(100.0, 90.0, 1e7));
    exchange.set_candles("KRW-DOGE", Timeframe::Week, weekly_candle(100.0, 120.0, 1e7));
    exchange.set_candles("KRW-BTT", Timeframe::Week, weekly_candle(100.0, 150.0, 1e7));
    exchange
}

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("voltx_it_{}_{}", name, uuid::Uuid::new_v4()))
}

fn engine_config(ledger_dir: PathBuf) -> Config {
    let mut config = Config::default();
    config.ledger.dir = ledger_dir;
    config.notifier.enabled = false;
    // Keep the pinned universe for the whole scenario
    config.trading.universe_refresh_minutes = 24 * 60;
    config
}

fn setup_engine(name: &str) -> (TradingEngine<MockExchange>, Arc<ManualClock>, PathBuf) {
    let dir = temp_dir(name);
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::default();
    exchange.set_candles("KRW-ETH", Timeframe::Minute3, dip_candles());
    exchange.set_price("KRW-ETH", 131.0);

    let shared: SharedClock = clock.clone();
    let mut engine =
        TradingEngine::new(engine_config(dir.clone()), exchange, shared, Some("itest")).unwrap();
    engine.set_universe(vec![Symbol::new("KRW-ETH")]);
    (engine, clock, dir)
}

fn trader(mode: TradingMode, clock: &Arc<ManualClock>) -> Trader {
    let shared: SharedClock = clock.clone();
    let risk = RiskManager::new(RiskConfig::default(), shared.clone(), chrono_tz::Asia::Seoul);
    let config = TradingConfig {
        mode,
        ..TradingConfig::default()
    };
    Trader::new(config, risk, shared, chrono_tz::Asia::Seoul)
}

fn ctx(strategy: StrategyKind, regime: RegimeType) -> EntryContext {
    EntryContext {
        strategy,
        regime,
        regime_factor: RegimeConfig::default().factor_for(regime),
        tier: Tier::L1,
    }
}

fn sell(symbol: &str, price: f64, reason: &str) -> Signal {
    Signal::exit(SignalAction::Sell, Symbol::new(symbol), price, reason)
}

// =============================================================================
// Engine Tests
// =============================================================================

#[tokio::test]
async fn test_dip_signal_opens_paper_position() {
    let (mut engine, _clock, dir) = setup_engine("entry");

    let outcome = engine.tick().await;
    assert_eq!(outcome.entries, vec![Symbol::new("KRW-ETH")]);
    assert!(outcome.exits.is_empty());
    assert_eq!(engine.regime().regime, RegimeType::Flat);

    let position = engine.trader().position(&Symbol::new("KRW-ETH")).unwrap();
    assert_eq!(position.strategy, StrategyKind::Dip);
    assert_eq!(position.entry_price, 131.0);
    assert_eq!(position.highest_price, 131.0);
    // 10M x 3% x FLAT 1.0
    assert_relative_eq!(position.cost, 300_000.0, epsilon = 1e-6);
    assert_relative_eq!(position.quantity * 131.0, 300_000.0, epsilon = 1e-6);
    assert_relative_eq!(position.sl_price, 131.0 * 0.985, epsilon = 1e-9);
    assert_relative_eq!(
        engine.trader().paper_balance().to_f64(),
        9_700_000.0,
        epsilon = 1e-6
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_hard_stop_then_cooldown_then_reentry() {
    let (mut engine, clock, dir) = setup_engine("cooldown");
    let eth = Symbol::new("KRW-ETH");

    engine.tick().await;
    assert!(engine.trader().has_position(&eth));

    // -2.3% from entry
    clock.advance(Duration::minutes(1));
    engine.exchange().set_price("KRW-ETH", 128.0);
    let outcome = engine.tick().await;
    assert!(outcome.entries.is_empty());
    assert_eq!(outcome.exits.len(), 1);
    let record = &outcome.exits[0];
    assert_eq!(record.strategy, "VOLTX_DIP");
    assert_eq!(record.side, "long");
    assert_eq!(record.exit_price, 128.0);
    assert!(record.reason.starts_with("Hard SL"));
    assert!(record.net_pnl_pct < record.gross_pnl_pct);
    assert!(!engine.trader().has_position(&eth));
    assert_eq!(engine.last_sell_time(&eth), Some(clock.now()));
    assert_eq!(engine.trader().risk().consecutive_losses, 1);

    // Same dip keeps firing but the symbol is cooling down
    clock.advance(Duration::minutes(1));
    let outcome = engine.tick().await;
    assert_eq!(outcome.blocked, 1);
    assert!(outcome.entries.is_empty());

    clock.advance(Duration::minutes(61));
    engine.exchange().set_price("KRW-ETH", 131.0);
    let outcome = engine.tick().await;
    assert_eq!(outcome.entries, vec![eth.clone()]);

    let ledger = engine.trader().ledger().unwrap().path().to_path_buf();
    assert!(ledger.ends_with("trades_itest.csv"));
    let rows = read_ledger(&ledger).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "KRW-ETH");
    assert_eq!(rows[0].regime, RegimeType::Flat);
    assert_eq!(rows[0].size.to_f64(), 300_000.0);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_missing_price_skips_exit_checks() {
    let (mut engine, clock, dir) = setup_engine("noprice");
    let eth = Symbol::new("KRW-ETH");
    engine.tick().await;

    clock.advance(Duration::minutes(1));
    engine.exchange().set_price("KRW-ETH", 0.0);
    let outcome = engine.tick().await;
    assert!(outcome.exits.is_empty());
    assert!(engine.trader().has_position(&eth));
    assert_eq!(engine.trader().position(&eth).unwrap().highest_price, 131.0);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_configured_regime_factor_sizes_entries() {
    let dir = temp_dir("factor");
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::default();
    exchange.set_candles("KRW-ETH", Timeframe::Minute3, dip_candles());
    exchange.set_price("KRW-ETH", 131.0);

    let mut config = engine_config(dir.clone());
    config.regime.flat_factor = 1.5;
    let shared: SharedClock = clock.clone();
    let mut engine = TradingEngine::new(config, exchange, shared, Some("itest")).unwrap();
    engine.set_universe(vec![Symbol::new("KRW-ETH")]);

    let outcome = engine.tick().await;
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(engine.regime().factor, 1.5);
    // 10M x 3% x 1.5
    let position = engine.trader().position(&Symbol::new("KRW-ETH")).unwrap();
    assert_relative_eq!(position.cost, 450_000.0, epsilon = 1e-6);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_halted_risk_blocks_engine_entries() {
    let (mut engine, _clock, dir) = setup_engine("halted");
    engine.trader_mut().risk_mut().update_pnl(-0.06);

    let outcome = engine.tick().await;
    assert_eq!(outcome.blocked, 1);
    assert!(outcome.entries.is_empty());
    assert!(engine.trader().positions().is_empty());
    assert_relative_eq!(
        engine.trader().paper_balance().to_f64(),
        10_000_000.0,
        epsilon = 1e-6
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_universe_refresh_ranks_movers_and_merges_gainers() {
    let dir = temp_dir("universe");
    let clock = Arc::new(ManualClock::new(start_time()));
    let mut config = engine_config(dir.clone());
    config.trading.universe_refresh_minutes = 60;
    config.universe.weekly_gainers = 1;

    let shared: SharedClock = clock.clone();
    let mut engine =
        TradingEngine::new(config, universe_exchange(), shared, Some("itest")).unwrap();
    engine.tick().await;

    // AAA's swing outweighs BBB's turnover; DOWN fails the trend filter,
    // DOGE the turnover floor and BTT the blacklist. DOGE returns as the
    // top weekly gainer.
    assert_eq!(
        engine.active_symbols(),
        &[
            Symbol::new("KRW-AAA"),
            Symbol::new("KRW-BBB"),
            Symbol::new("KRW-DOGE")
        ]
    );
    assert_eq!(engine.exchange().fetch_count("KRW-DOGE", Timeframe::Hour1), 0);
    assert_eq!(engine.exchange().fetch_count("KRW-BTT", Timeframe::Hour1), 0);
    assert_eq!(engine.exchange().fetch_count("KRW-BTT", Timeframe::Week), 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_universe_and_regime_refresh_hourly() {
    let dir = temp_dir("cadence");
    let clock = Arc::new(ManualClock::new(start_time()));
    let mut config = engine_config(dir.clone());
    config.trading.universe_refresh_minutes = 60;
    config.trading.regime_refresh_minutes = 60;

    let shared: SharedClock = clock.clone();
    let mut engine =
        TradingEngine::new(config, universe_exchange(), shared, Some("itest")).unwrap();
    engine.tick().await;
    assert_eq!(engine.exchange().fetch_count("KRW-AAA", Timeframe::Hour1), 1);
    assert_eq!(engine.exchange().fetch_count("KRW-BTC", Timeframe::Hour4), 1);

    for minutes in [59, 1] {
        clock.advance(Duration::minutes(minutes));
        engine.tick().await;
        assert_eq!(engine.exchange().fetch_count("KRW-AAA", Timeframe::Hour1), 1);
        assert_eq!(engine.exchange().fetch_count("KRW-BTC", Timeframe::Hour4), 1);
    }

    // 61 minutes after the first refresh
    clock.advance(Duration::minutes(1));
    engine.tick().await;
    assert_eq!(engine.exchange().fetch_count("KRW-AAA", Timeframe::Hour1), 2);
    assert_eq!(engine.exchange().fetch_count("KRW-BTC", Timeframe::Hour4), 2);
    assert_eq!(engine.tick_count(), 4);

    let _ = std::fs::remove_dir_all(dir);
}

// =============================================================================
// Trader Tests
// =============================================================================

#[tokio::test]
async fn test_breakout_trailing_stop_follows_high_water_mark() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::default();
    let mut trader = trader(TradingMode::Paper, &clock);
    let config = TradingConfig::default();
    let sol = Symbol::new("KRW-SOL");

    let buy = Signal::buy(sol.clone(), 200.0, "VBS: Target 199.00 breached");
    assert!(
        trader
            .enter(&exchange, &buy, ctx(StrategyKind::Breakout, RegimeType::Bull))
            .await
    );
    // BULL L1: 10M x 3% x 1.2
    assert_relative_eq!(trader.position(&sol).unwrap().cost, 360_000.0, epsilon = 1e-6);

    for price in [205.0, 212.0, 220.0, 215.0] {
        let position = trader.position(&sol).unwrap();
        assert!(check_exit(position, price, &config).is_none());
        trader.update_positions(&HashMap::from([(sol.clone(), price)]));
    }
    assert_eq!(trader.position(&sol).unwrap().highest_price, 220.0);

    // Trail sits at 213.4
    let exit = check_exit(trader.position(&sol).unwrap(), 213.0, &config).unwrap();
    assert!(exit.reason.starts_with("Trailing Stop"));
    let record = trader.exit(&exchange, &exit).await.unwrap();
    assert_eq!(record.strategy, "VOLTX_VBS");
    assert_eq!(record.regime, RegimeType::Bull);
    assert_relative_eq!(record.gross_pnl_pct, 0.065, epsilon = 1e-9);
    assert!(trader.positions().is_empty());
    // A winner leaves the breaker untouched
    assert_eq!(trader.risk().consecutive_losses, 0);
    assert!(!trader.risk().is_trading_halted);
}

#[tokio::test]
async fn test_one_position_per_symbol() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::default();
    let mut trader = trader(TradingMode::Paper, &clock);

    let buy = Signal::buy(Symbol::new("KRW-XRP"), 700.0, "DIP");
    assert!(trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await);
    assert!(
        !trader
            .enter(&exchange, &buy, ctx(StrategyKind::Fibonacci, RegimeType::Flat))
            .await
    );
    assert_eq!(trader.positions().len(), 1);
    assert_relative_eq!(trader.paper_balance().to_f64(), 9_700_000.0, epsilon = 1e-6);
}

#[tokio::test]
async fn test_live_losses_halt_trading_until_next_day() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::with_balance(10_000_000.0);
    let mut trader = trader(TradingMode::Live, &clock);
    let eth = Symbol::new("KRW-ETH");

    let buy = Signal::buy(eth.clone(), 100.0, "DIP");
    assert!(trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await);
    let first = trader.exit(&exchange, &sell("KRW-ETH", 98.0, "Hard SL")).await.unwrap();
    assert_relative_eq!(first.net_pnl_pct, -0.02, epsilon = 1e-9);
    assert_eq!(first.fees_slippage.to_f64(), 0.0);

    assert!(trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await);
    trader.exit(&exchange, &sell("KRW-ETH", 97.0, "Hard SL")).await.unwrap();

    assert!(trader.risk().is_trading_halted);
    assert!(!trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await);

    let orders = exchange.orders();
    assert_eq!(orders.len(), 4);
    match &orders[0] {
        OrderRequest::MarketBuy { symbol, notional } => {
            assert_eq!(symbol, &eth);
            assert_relative_eq!(*notional, 300_000.0, epsilon = 1e-6);
        }
        other => panic!("expected market buy, got {:?}", other),
    }
    match &orders[1] {
        OrderRequest::MarketSell { volume, .. } => {
            assert_relative_eq!(*volume, 3000.0, epsilon = 1e-9)
        }
        other => panic!("expected market sell, got {:?}", other),
    }

    // 00:00 KST next day
    clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 15, 0, 0).unwrap());
    assert!(!trader.risk_mut().is_halted());
    assert_eq!(trader.risk().consecutive_losses, 0);
    assert!(trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await);
}

#[tokio::test]
async fn test_failed_live_sell_keeps_position() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::with_balance(10_000_000.0);
    let mut trader = trader(TradingMode::Live, &clock);
    let eth = Symbol::new("KRW-ETH");

    let buy = Signal::buy(eth.clone(), 100.0, "DIP");
    assert!(trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await);

    exchange.fail_orders.store(true, Ordering::SeqCst);
    assert!(trader.exit(&exchange, &sell("KRW-ETH", 90.0, "Hard SL")).await.is_none());
    assert!(trader.has_position(&eth));
    assert_eq!(trader.risk().consecutive_losses, 0);
    assert_eq!(trader.risk().daily_pnl_pct, 0.0);

    // Failed buy opens nothing
    let other = Signal::buy(Symbol::new("KRW-SOL"), 50.0, "DIP");
    assert!(!trader.enter(&exchange, &other, ctx(StrategyKind::Dip, RegimeType::Flat)).await);
    assert_eq!(trader.positions().len(), 1);
}

// =============================================================================
// Ledger and Report Tests
// =============================================================================

#[tokio::test]
async fn test_paper_trades_feed_report() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let exchange = MockExchange::default();
    let dir = temp_dir("report");
    let ledger = voltx::ledger::TradeLedger::new(dir.join("trades_r.csv"));
    let mut trader = trader(TradingMode::Paper, &clock).with_ledger(ledger);

    let buy = Signal::buy(Symbol::new("KRW-ETH"), 100.0, "DIP");
    trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await;
    clock.advance(Duration::minutes(30));
    trader.exit(&exchange, &sell("KRW-ETH", 105.1, "Fixed TP")).await.unwrap();

    trader.enter(&exchange, &buy, ctx(StrategyKind::Dip, RegimeType::Flat)).await;
    clock.advance(Duration::minutes(30));
    trader.exit(&exchange, &sell("KRW-ETH", 98.4, "Hard SL")).await.unwrap();

    let records = read_ledger(dir.join("trades_r.csv")).unwrap();
    assert_eq!(records.len(), 2);
    let report = PerformanceReport::from_records("r", &records, 10_000_000.0);
    assert_eq!(report.overall.total_trades, 2);
    assert_eq!(report.overall.winning_trades, 1);
    assert_relative_eq!(report.overall.win_rate, 0.5, epsilon = 1e-12);
    assert!(report.by_strategy.contains_key("VOLTX_DIP"));
    assert!(report.render().contains("VOLT-X Performance Report (r)"));

    let _ = std::fs::remove_dir_all(dir);
}
