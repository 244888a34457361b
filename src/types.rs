//! Core data types shared by the decision core, the trader and the exchange layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick.
///
/// `turnover` is the quote-currency traded value of the candle (KRW on
/// Upbit). Sources that do not report it leave it at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub turnover: f64,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(datetime, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    pub fn new_unchecked(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
            turnover: 0.0,
        }
    }

    pub fn with_turnover(mut self, turnover: f64) -> Self {
        self.turnover = turnover;
        self
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }
        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Close at or above open
    pub fn is_green(&self) -> bool {
        self.close >= self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    /// Traded value, falling back to `volume * close` when the source gave none
    pub fn traded_value(&self) -> f64 {
        if self.turnover > 0.0 {
            self.turnover
        } else {
            self.volume * self.close
        }
    }
}

/// Market symbol (e.g. `KRW-BTC`) backed by `Arc<str>` so clones are cheap.
///
/// Symbols travel through the scanner map, the position book, signals and
/// ledger rows every tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Quote currency prefix of an Upbit market code (`KRW` for `KRW-BTC`)
    pub fn quote(&self) -> &str {
        self.0.split('-').next().unwrap_or("")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Broad market regime of the reference asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegimeType {
    Bull,
    Bear,
    Flat,
}

impl RegimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeType::Bull => "BULL",
            RegimeType::Bear => "BEAR",
            RegimeType::Flat => "FLAT",
        }
    }
}

impl fmt::Display for RegimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbol liquidity tier used for base position sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    L1,
    L2,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::L1 => f.write_str("L1"),
            Tier::L2 => f.write_str("L2"),
        }
    }
}

/// Which evaluator opened a position. Drives the exit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Dip,
    Breakout,
    Fibonacci,
}

impl StrategyKind {
    /// Name recorded in the ledger
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Dip => "VOLTX_DIP",
            StrategyKind::Breakout => "VOLTX_VBS",
            StrategyKind::Fibonacci => "VOLTX_FIB",
        }
    }

    /// Short label passed to the risk gatekeeper
    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::Dip => "DIP",
            StrategyKind::Breakout => "VBS",
            StrategyKind::Fibonacci => "FIB",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VOLTX_DIP" | "DIP" => Some(StrategyKind::Dip),
            "VOLTX_VBS" | "VBS" => Some(StrategyKind::Breakout),
            "VOLTX_FIB" | "FIB" => Some(StrategyKind::Fibonacci),
            _ => None,
        }
    }

    /// Trailing-stop exits instead of a fixed take-profit
    pub fn uses_trailing_stop(&self) -> bool {
        matches!(self, StrategyKind::Breakout)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    TakeProfit,
    StopLoss,
}

impl SignalAction {
    pub fn is_exit(&self) -> bool {
        matches!(
            self,
            SignalAction::Sell | SignalAction::TakeProfit | SignalAction::StopLoss
        )
    }
}

/// Trade instruction produced by a strategy or by the exit logic. Consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    pub symbol: Symbol,
    pub price: f64,
    pub reason: String,
    pub quantity: Option<f64>,
}

impl Signal {
    pub fn buy(symbol: Symbol, price: f64, reason: impl Into<String>) -> Self {
        Self {
            action: SignalAction::Buy,
            symbol,
            price,
            reason: reason.into(),
            quantity: None,
        }
    }

    pub fn exit(
        action: SignalAction,
        symbol: Symbol,
        price: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            symbol,
            price,
            reason: reason.into(),
            quantity: None,
        }
    }
}

/// Open long position. At most one per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub strategy: StrategyKind,
    pub tier: Tier,
    pub entry_regime: RegimeType,
    pub entry_price: f64,
    pub quantity: f64,
    /// Notional spent at entry
    pub cost: f64,
    pub entry_time: DateTime<Utc>,
    /// High-water mark since entry
    pub highest_price: f64,
    pub sl_price: f64,
    pub tp_price: f64,
}

impl Position {
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
    }

    /// Raise the high-water mark; never lowers it
    pub fn update_high(&mut self, price: f64) {
        if price > self.highest_price {
            self.highest_price = price;
        }
    }
}

// ============================================================================
// Money Type
// ============================================================================

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Decimal amount in quote currency.
///
/// The paper account and the ledger's monetary columns are kept in `Money`
/// so repeated entry/exit bookkeeping does not drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Money(value)
    }

    /// Lossy for values with many decimal places; NaN and infinities map to zero.
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or(Decimal::ZERO))
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl From<f64> for Money {
    fn from(value: f64) -> Self {
        Money::from_f64(value)
    }
}

impl From<Money> for f64 {
    fn from(value: Money) -> Self {
        value.to_f64()
    }
}
