//! Entry strategies
//!
//! Each strategy is a stateless evaluator: given the current market view of
//! one symbol it either returns a BUY [`Signal`] or nothing. Every strategy
//! exposes a pure `evaluate` over already-fetched candles and a
//! `check_signal` that fetches what it needs first.

pub mod dip_buy;
pub mod fibonacci_morning;
pub mod volatility_breakout;

pub use dip_buy::{DipBuyConfig, DipBuyStrategy};
pub use fibonacci_morning::{FibonacciMorningConfig, FibonacciMorningStrategy};
pub use volatility_breakout::{VolatilityBreakoutConfig, VolatilityBreakoutStrategy};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::exchange::{Exchange, Timeframe};
use crate::scanner::ScanStatus;
use crate::{Candle, RegimeType, Signal, StrategyKind, Symbol};

/// Market view handed to every strategy for one symbol on one tick
#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub symbol: &'a Symbol,
    pub short_tf: Timeframe,
    pub mid_tf: Timeframe,
    pub regime: RegimeType,
    pub scan_status: ScanStatus,
    pub now: DateTime<Utc>,
    /// Short-timeframe candles already fetched this tick, if any
    pub short_candles: Option<&'a [Candle]>,
}

impl<'a> SignalInput<'a> {
    pub fn new(
        symbol: &'a Symbol,
        regime: RegimeType,
        scan_status: ScanStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            short_tf: Timeframe::Minute3,
            mid_tf: Timeframe::Minute15,
            regime,
            scan_status,
            now,
            short_candles: None,
        }
    }

    pub fn with_short_candles(mut self, candles: &'a [Candle]) -> Self {
        self.short_candles = Some(candles);
        self
    }

    /// Cached short candles, or a fresh fetch covering `lookback_minutes`
    pub(crate) async fn short_series<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        lookback_minutes: i64,
    ) -> Vec<Candle> {
        match self.short_candles {
            Some(candles) => candles.to_vec(),
            None => {
                let start = self.now - chrono::Duration::minutes(lookback_minutes);
                exchange
                    .fetch_candles(self.symbol, self.short_tf, start, self.now)
                    .await
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub dip: DipBuyConfig,
    pub breakout: VolatilityBreakoutConfig,
    pub fibonacci: FibonacciMorningConfig,
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Dip(DipBuyStrategy),
    Breakout(VolatilityBreakoutStrategy),
    Fibonacci(FibonacciMorningStrategy),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Dip(_) => StrategyKind::Dip,
            Strategy::Breakout(_) => StrategyKind::Breakout,
            Strategy::Fibonacci(_) => StrategyKind::Fibonacci,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// BUY signal for `input.symbol`, or `None`. Never mutates anything.
    pub async fn check_signal<E: Exchange + ?Sized>(
        &self,
        input: &SignalInput<'_>,
        exchange: &E,
    ) -> Option<Signal> {
        match self {
            Strategy::Dip(s) => s.check_signal(input, exchange).await,
            Strategy::Breakout(s) => s.check_signal(input, exchange).await,
            Strategy::Fibonacci(s) => s.check_signal(input, exchange).await,
        }
    }
}

/// Enabled strategies in evaluation order
pub fn create_strategies(config: &StrategiesConfig, timezone: Tz) -> Vec<Strategy> {
    let mut strategies = Vec::new();
    if config.dip.enabled {
        strategies.push(Strategy::Dip(DipBuyStrategy::new(config.dip.clone())));
    }
    if config.breakout.enabled {
        strategies.push(Strategy::Breakout(VolatilityBreakoutStrategy::new(
            config.breakout.clone(),
        )));
    }
    if config.fibonacci.enabled {
        strategies.push(Strategy::Fibonacci(FibonacciMorningStrategy::new(
            config.fibonacci.clone(),
            timezone,
        )));
    }
    strategies
}
