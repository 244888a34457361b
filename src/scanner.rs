//! Volume anomaly scanner
//!
//! Tracks per-symbol volume state on 3-minute candles. A relative-volume
//! spike marks a trend as active; a blow-off candle with an overbought RSI
//! marks the symbol exhausted for a cooldown period.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::exchange::{Exchange, Timeframe};
use crate::indicators;
use crate::{Candle, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    Normal,
    TrendActive,
    Exhausted,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Normal => f.write_str("NORMAL"),
            ScanStatus::TrendActive => f.write_str("TREND_ACTIVE"),
            ScanStatus::Exhausted => f.write_str("EXHAUSTED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Prior candles averaged for relative volume
    pub avg_window: usize,
    pub min_candles: usize,
    pub spike_ratio: f64,
    /// Relative volume above which climax patterns are checked
    pub climax_ratio: f64,
    pub upper_shadow_ratio: f64,
    pub drop_from_high: f64,
    pub rsi_period: usize,
    pub rsi_exhausted: f64,
    pub cooldown_minutes: i64,
    /// History fetched by [`VolumeScanner::scan`]
    pub lookback_minutes: i64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            avg_window: 20,
            min_candles: 20,
            spike_ratio: 3.0,
            climax_ratio: 5.0,
            upper_shadow_ratio: 0.5,
            drop_from_high: 0.03,
            rsi_period: 14,
            rsi_exhausted: 70.0,
            cooldown_minutes: 60,
            lookback_minutes: 400,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerState {
    pub volume_spike: bool,
    pub volume_climax: bool,
    pub is_exhausted: bool,
    pub exhausted_until: Option<DateTime<Utc>>,
}

impl ScannerState {
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.is_exhausted && self.exhausted_until.map_or(false, |until| now < until)
    }

    fn clear(&mut self) {
        *self = ScannerState::default();
    }
}

#[derive(Debug)]
pub struct VolumeScanner {
    config: ScannerConfig,
    clock: SharedClock,
    states: HashMap<Symbol, ScannerState>,
}

impl VolumeScanner {
    pub fn new(config: ScannerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn state(&self, symbol: &Symbol) -> Option<&ScannerState> {
        self.states.get(symbol)
    }

    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Drop state for symbols outside `active`, keeping any still cooling down
    pub fn retain_symbols(&mut self, active: &[Symbol]) {
        let now = self.clock.now();
        let before = self.states.len();
        self.states
            .retain(|symbol, state| active.contains(symbol) || state.is_cooling_down(now));
        let dropped = before - self.states.len();
        if dropped > 0 {
            debug!("Scanner evicted {} stale symbols", dropped);
        }
    }

    /// Update the state of `symbol` from its 3-minute candles (oldest first)
    pub fn scan_candles(&mut self, symbol: &Symbol, candles: &[Candle]) -> ScanStatus {
        let now = self.clock.now();
        let cfg = &self.config;
        let state = self.states.entry(symbol.clone()).or_default();

        if state.is_exhausted {
            if state.is_cooling_down(now) {
                return ScanStatus::Exhausted;
            }
            info!("{} exhaustion cooldown over", symbol);
            state.clear();
        }

        if candles.len() < cfg.min_candles.max(2) {
            return ScanStatus::Normal;
        }

        let current = &candles[candles.len() - 1];
        let prior = &candles[candles.len().saturating_sub(cfg.avg_window + 1)..candles.len() - 1];
        let prior_volumes: Vec<f64> = prior.iter().map(|c| c.volume).collect();
        let mut avg_volume = indicators::mean(&prior_volumes).unwrap_or(0.0);
        if avg_volume <= 0.0 {
            avg_volume = 1.0;
        }
        let rel_vol = current.volume / avg_volume;

        if rel_vol >= cfg.spike_ratio && !state.volume_spike {
            state.volume_spike = true;
            info!("{} volume spike ({:.1}x)", symbol, rel_vol);
        }

        if rel_vol >= cfg.climax_ratio {
            let range = current.range();
            let shadow_ratio = if range > 0.0 {
                current.upper_shadow() / range
            } else {
                0.0
            };
            let drop_from_high = if current.high > 0.0 {
                (current.high - current.close) / current.high
            } else {
                0.0
            };

            if shadow_ratio >= cfg.upper_shadow_ratio || drop_from_high >= cfg.drop_from_high {
                state.volume_climax = true;
                let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                let rsi = indicators::last(&indicators::rsi(&closes, cfg.rsi_period));

                if let Some(rsi) = rsi.filter(|r| *r >= cfg.rsi_exhausted) {
                    state.is_exhausted = true;
                    state.exhausted_until = Some(now + Duration::minutes(cfg.cooldown_minutes));
                    warn!(
                        "{} exhausted: rel vol {:.1}x, shadow {:.2}, drop {:.2}%, RSI {:.1}",
                        symbol,
                        rel_vol,
                        shadow_ratio,
                        drop_from_high * 100.0,
                        rsi
                    );
                    return ScanStatus::Exhausted;
                }
            }
        }

        if state.volume_spike {
            ScanStatus::TrendActive
        } else {
            ScanStatus::Normal
        }
    }

    /// Fetch 3-minute candles for each symbol and scan them
    pub async fn scan<E: Exchange + ?Sized>(
        &mut self,
        exchange: &E,
        symbols: &[Symbol],
    ) -> HashMap<Symbol, ScanStatus> {
        let end = self.clock.now();
        let start = end - Duration::minutes(self.config.lookback_minutes);

        let mut statuses = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let candles = exchange
                .fetch_candles(symbol, Timeframe::Minute3, start, end)
                .await;
            let status = self.scan_candles(symbol, &candles);
            statuses.insert(symbol.clone(), status);
        }
        statuses
    }
}
