//! Order execution and position tracking
//!
//! Paper mode fills at the signal price against a simulated balance and
//! charges slippage plus fee on the sell side only. Live mode sends market
//! orders through the [`Exchange`] and books price-based PnL. Either way a
//! closed trade updates the risk manager exactly once and is appended to the
//! ledger.

use chrono_tz::Tz;
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::config::{TradingConfig, TradingMode};
use crate::exchange::{Exchange, OrderRequest};
use crate::ledger::{TradeLedger, TradeRecord};
use crate::notifier::TelegramNotifier;
use crate::risk::RiskManager;
use crate::{Money, Position, RegimeType, Signal, StrategyKind, Symbol, Tier};

/// Entry context the signal itself does not carry
#[derive(Debug, Clone, Copy)]
pub struct EntryContext {
    pub strategy: StrategyKind,
    pub regime: RegimeType,
    /// Sizing multiplier from the regime snapshot
    pub regime_factor: f64,
    pub tier: Tier,
}

/// Cash flows of one closed position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub cost: f64,
    pub net_proceeds: f64,
    pub gross_pnl: f64,
    pub net_pnl: f64,
    /// Mid-price exit value minus net proceeds
    pub friction: f64,
}

impl ExitFill {
    /// Sell-side slippage then fee on the slipped proceeds
    pub fn paper(position: &Position, price: f64, slippage_rate: f64, fee_rate: f64) -> Self {
        let cost = position.entry_price * position.quantity;
        let mid_value = position.quantity * price;
        let proceeds = position.quantity * price * (1.0 - slippage_rate);
        let net_proceeds = proceeds - proceeds * fee_rate;
        Self {
            cost,
            net_proceeds,
            gross_pnl: mid_value - cost,
            net_pnl: net_proceeds - cost,
            friction: mid_value - net_proceeds,
        }
    }

    pub fn frictionless(position: &Position, price: f64) -> Self {
        Self::paper(position, price, 0.0, 0.0)
    }

    pub fn gross_pct(&self) -> f64 {
        if self.cost > 0.0 {
            self.gross_pnl / self.cost
        } else {
            0.0
        }
    }

    pub fn net_pct(&self) -> f64 {
        if self.cost > 0.0 {
            self.net_pnl / self.cost
        } else {
            0.0
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[derive(Debug)]
pub struct Trader {
    config: TradingConfig,
    risk: RiskManager,
    positions: HashMap<Symbol, Position>,
    paper_balance: Money,
    ledger: Option<TradeLedger>,
    notifier: Option<TelegramNotifier>,
    clock: SharedClock,
    timezone: Tz,
}

impl Trader {
    pub fn new(config: TradingConfig, risk: RiskManager, clock: SharedClock, timezone: Tz) -> Self {
        let paper_balance = Money::from_f64(config.initial_balance);
        Self {
            config,
            risk,
            positions: HashMap::new(),
            paper_balance,
            ledger: None,
            notifier: None,
            clock,
            timezone,
        }
    }

    pub fn with_ledger(mut self, ledger: TradeLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_notifier(mut self, notifier: TelegramNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn mode(&self) -> TradingMode {
        self.config.mode
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    pub fn positions(&self) -> &HashMap<Symbol, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn paper_balance(&self) -> Money {
        self.paper_balance
    }

    pub fn ledger(&self) -> Option<&TradeLedger> {
        self.ledger.as_ref()
    }

    /// Quote-currency balance available for sizing
    pub async fn balance<E: Exchange + ?Sized>(&self, exchange: &E) -> f64 {
        match self.config.mode {
            TradingMode::Paper => self.paper_balance.to_f64(),
            TradingMode::Live => exchange.get_balance().await,
        }
    }

    /// Open a position for a BUY signal. Returns whether a position was opened.
    pub async fn enter<E: Exchange + ?Sized>(
        &mut self,
        exchange: &E,
        signal: &Signal,
        ctx: EntryContext,
    ) -> bool {
        let symbol = &signal.symbol;
        let price = signal.price;
        if self.positions.contains_key(symbol) {
            info!("Entry skipped for {}: position already open", symbol);
            return false;
        }
        if !(price > 0.0) {
            warn!("Entry skipped for {}: invalid price {}", symbol, price);
            return false;
        }

        let balance = self.balance(exchange).await;
        let size = self
            .risk
            .calculate_position_size(balance, ctx.regime_factor, ctx.tier);
        if size <= 0.0 {
            warn!(
                "[SKIP] {}: risk manager returned 0 size (halted or below minimum)",
                symbol
            );
            return false;
        }
        let quantity = size / price;

        match self.config.mode {
            TradingMode::Paper => {
                self.paper_balance -= Money::from_f64(size);
                info!(
                    "📈 [PAPER] BUY {} qty={:.6} @ {} cost={:.0} | {}",
                    symbol, quantity, price, size, signal.reason
                );
            }
            TradingMode::Live => {
                let order = OrderRequest::market_buy(symbol.clone(), size);
                match exchange.place_order(&order).await {
                    Ok(ack) => info!(
                        "📈 [LIVE] BUY {} notional={:.0} @ ~{} | order {} | {}",
                        symbol, size, price, ack.uuid, signal.reason
                    ),
                    Err(e) => {
                        error!("Live buy failed for {}: {}", symbol, e);
                        return false;
                    }
                }
            }
        }

        let position = Position {
            symbol: symbol.clone(),
            strategy: ctx.strategy,
            tier: ctx.tier,
            entry_regime: ctx.regime,
            entry_price: price,
            quantity,
            cost: size,
            entry_time: self.clock.now(),
            highest_price: price,
            sl_price: price * (1.0 - self.config.hard_stop_pct),
            tp_price: price * (1.0 + self.config.take_profit_pct),
        };
        self.positions.insert(symbol.clone(), position);

        self.notify(&format!(
            "BUY {} @ {} ({}, {:.0} {})",
            symbol,
            price,
            ctx.strategy.label(),
            size,
            symbol.quote()
        ))
        .await;
        true
    }

    /// Close the position named by an exit signal at the signal price.
    ///
    /// Returns the ledger record of the closed trade, or `None` when there is
    /// no such position or the sell order failed (position kept).
    pub async fn exit<E: Exchange + ?Sized>(
        &mut self,
        exchange: &E,
        signal: &Signal,
    ) -> Option<TradeRecord> {
        let symbol = &signal.symbol;
        let position = self.positions.remove(symbol)?;
        let price = signal.price;

        let fill = match self.config.mode {
            TradingMode::Paper => {
                let fill = ExitFill::paper(
                    &position,
                    price,
                    self.config.slippage_rate,
                    self.config.fee_rate,
                );
                self.paper_balance += Money::from_f64(fill.net_proceeds);
                fill
            }
            TradingMode::Live => {
                let order = OrderRequest::market_sell(symbol.clone(), position.quantity);
                if let Err(e) = exchange.place_order(&order).await {
                    error!("Live sell failed for {}: {}", symbol, e);
                    self.positions.insert(symbol.clone(), position);
                    return None;
                }
                ExitFill::frictionless(&position, price)
            }
        };

        let emoji = if fill.net_pnl > 0.0 { "✅" } else { "❌" };
        info!(
            "{} [{}] SELL {} @ {} | PnL={:+.0} ({:+.2}%) | {}",
            emoji,
            self.config.mode,
            symbol,
            price,
            fill.net_pnl,
            fill.net_pct() * 100.0,
            signal.reason
        );

        self.risk.update_pnl(fill.net_pct());

        let record = TradeRecord {
            timestamp: self.clock.now().with_timezone(&self.timezone).naive_local(),
            symbol: symbol.to_string(),
            strategy: position.strategy.name().to_string(),
            tier: position.tier,
            regime: position.entry_regime,
            side: "long".to_string(),
            size: Money::from_f64(fill.cost).round_dp(0),
            entry_price: position.entry_price,
            exit_price: price,
            gross_pnl_pct: round4(fill.gross_pct()),
            net_pnl_pct: round4(fill.net_pct()),
            fees_slippage: Money::from_f64(fill.friction).round_dp(4),
            reason: signal.reason.clone(),
        };

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.append(&record) {
                error!("Failed to write trade ledger: {:#}", e);
            }
        }

        self.notify(&format!(
            "SELL {} @ {} | {:+.2}% | {}",
            symbol,
            price,
            fill.net_pct() * 100.0,
            signal.reason
        ))
        .await;

        Some(record)
    }

    /// Raise high-water marks of held positions from this tick's prices
    pub fn update_positions(&mut self, prices: &HashMap<Symbol, f64>) {
        for (symbol, position) in self.positions.iter_mut() {
            if let Some(&price) = prices.get(symbol) {
                position.update_high(price);
            }
        }
    }

    /// Value of cash plus open positions at the given prices (paper mode)
    pub fn paper_equity(&self, prices: &HashMap<Symbol, f64>) -> f64 {
        let open: f64 = self
            .positions
            .values()
            .map(|p| p.quantity * prices.get(&p.symbol).copied().unwrap_or(p.entry_price))
            .sum();
        self.paper_balance.to_f64() + open
    }

    async fn notify(&self, msg: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(msg).await;
        }
    }
}
