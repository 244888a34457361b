//! Risk management
//!
//! Daily circuit breaker and position sizing. The manager is either ACTIVE or
//! HALTED; a halt lasts until the calendar date rolls over in the trading
//! timezone. Every public call first applies that daily reset.
//!
//! Position sizing formula:
//! ```text
//! size = balance * base_pct(tier) * regime_factor * loss_factor
//! size = min(size, balance * max_position_pct), 0 below the exchange minimum
//! ```

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::{RegimeType, StrategyKind, Tier};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Halt once the day's summed trade returns reach this (negative) level
    pub daily_loss_limit: f64,
    pub max_consecutive_losses: usize,
    pub base_pct_l1: f64,
    pub base_pct_l2: f64,
    /// Size multiplier after two straight losses
    pub two_loss_factor: f64,
    /// Size multiplier after three or more straight losses
    pub three_loss_factor: f64,
    pub max_position_pct: f64,
    /// Smallest order notional the exchange accepts
    pub min_order_value: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: -0.05,
            max_consecutive_losses: 4,
            base_pct_l1: 0.03,
            base_pct_l2: 0.015,
            two_loss_factor: 0.8,
            three_loss_factor: 0.5,
            max_position_pct: 0.05,
            min_order_value: 6000.0,
        }
    }
}

impl RiskConfig {
    pub fn base_pct(&self, tier: Tier) -> f64 {
        match tier {
            Tier::L1 => self.base_pct_l1,
            Tier::L2 => self.base_pct_l2,
        }
    }

    pub fn loss_factor(&self, consecutive_losses: usize) -> f64 {
        match consecutive_losses {
            0 | 1 => 1.0,
            2 => self.two_loss_factor,
            _ => self.three_loss_factor,
        }
    }
}

/// Daily circuit breaker and sizer
#[derive(Debug)]
pub struct RiskManager {
    pub config: RiskConfig,
    pub daily_pnl_pct: f64,
    pub consecutive_losses: usize,
    pub is_trading_halted: bool,
    pub last_reset_date: NaiveDate,
    clock: SharedClock,
    timezone: Tz,
}

impl RiskManager {
    pub fn new(config: RiskConfig, clock: SharedClock, timezone: Tz) -> Self {
        let today = clock.now().with_timezone(&timezone).date_naive();
        Self {
            config,
            daily_pnl_pct: 0.0,
            consecutive_losses: 0,
            is_trading_halted: false,
            last_reset_date: today,
            clock,
            timezone,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.timezone).date_naive()
    }

    fn check_daily_reset(&mut self) {
        let today = self.today();
        if today != self.last_reset_date {
            info!(
                "New trading day {}: resetting risk counters (pnl {:.2}%, losses {})",
                today,
                self.daily_pnl_pct * 100.0,
                self.consecutive_losses
            );
            self.daily_pnl_pct = 0.0;
            self.consecutive_losses = 0;
            self.is_trading_halted = false;
            self.last_reset_date = today;
        }
    }

    pub fn is_halted(&mut self) -> bool {
        self.check_daily_reset();
        self.is_trading_halted
    }

    /// Record one closed trade's return (fraction, e.g. `-0.015`)
    pub fn update_pnl(&mut self, trade_pct: f64) {
        self.check_daily_reset();

        if trade_pct < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
        self.daily_pnl_pct += trade_pct;

        if self.is_trading_halted {
            return;
        }
        if self.daily_pnl_pct <= self.config.daily_loss_limit {
            self.is_trading_halted = true;
            warn!(
                "Trading halted: daily PnL {:.2}% <= {:.2}%",
                self.daily_pnl_pct * 100.0,
                self.config.daily_loss_limit * 100.0
            );
        } else if self.consecutive_losses >= self.config.max_consecutive_losses {
            self.is_trading_halted = true;
            warn!(
                "Trading halted: {} consecutive losses",
                self.consecutive_losses
            );
        }
    }

    /// Notional to commit to a new entry, 0 when no entry should be made.
    /// `regime_factor` is the current regime snapshot's factor.
    pub fn calculate_position_size(&mut self, balance: f64, regime_factor: f64, tier: Tier) -> f64 {
        self.check_daily_reset();
        if self.is_trading_halted || !(balance > 0.0) {
            return 0.0;
        }

        let cfg = &self.config;
        let size = balance
            * cfg.base_pct(tier)
            * regime_factor
            * cfg.loss_factor(self.consecutive_losses);
        let size = size.min(balance * cfg.max_position_pct);

        if size < cfg.min_order_value {
            return 0.0;
        }
        size
    }

    /// Gatekeeper for new entries. Only the halt state vetoes for now.
    pub fn check_entry_allowed(&mut self, regime: RegimeType, strategy: StrategyKind) -> bool {
        if self.is_halted() {
            info!(
                "Entry rejected for {} in {}: trading halted",
                strategy.label(),
                regime
            );
            return false;
        }
        true
    }
}
