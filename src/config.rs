//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files with environment
//! variable support for API credentials. Every section has serde defaults,
//! so a partial file (or none at all) yields a complete configuration.

use anyhow::{anyhow, ensure, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::exchange::auth::Credentials;
use crate::exchange::ClientConfig;
use crate::ledger::LedgerConfig;
use crate::notifier::NotifierConfig;
use crate::regime::RegimeConfig;
use crate::risk::RiskConfig;
use crate::scanner::ScannerConfig;
use crate::strategies::StrategiesConfig;
use crate::universe::UniverseConfig;
use crate::{Symbol, Tier};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub universe: UniverseConfig,
    pub regime: RegimeConfig,
    pub scanner: ScannerConfig,
    pub risk: RiskConfig,
    pub strategies: StrategiesConfig,
    pub ledger: LedgerConfig,
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load configuration from JSON file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Credentials from `UPBIT_ACCESS_KEY`/`UPBIT_SECRET_KEY`, Telegram from
    /// `TELEGRAM_TOKEN`/`TELEGRAM_CHAT_ID`
    pub fn apply_env(&mut self) {
        if let Ok(access_key) = std::env::var("UPBIT_ACCESS_KEY") {
            self.exchange.access_key = Some(access_key);
        }
        if let Ok(secret_key) = std::env::var("UPBIT_SECRET_KEY") {
            self.exchange.secret_key = Some(secret_key);
        }
        self.notifier.apply_env();
    }

    pub fn validate(&self) -> Result<()> {
        self.trading.timezone()?;
        ensure!(
            self.trading.tick_interval_secs > 0,
            "trading.tick_interval_secs must be positive"
        );
        ensure!(
            self.trading.initial_balance > 0.0,
            "trading.initial_balance must be positive"
        );
        ensure!(
            self.risk.max_position_pct > 0.0 && self.risk.max_position_pct <= 1.0,
            "risk.max_position_pct must be in (0, 1]"
        );
        ensure!(
            self.risk.daily_loss_limit < 0.0,
            "risk.daily_loss_limit must be negative"
        );
        ensure!(self.universe.limit > 0, "universe.limit must be positive");
        self.strategies.fibonacci.validate()?;
        Ok(())
    }
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    pub base_url: String,
    pub quote_currency: String,
    pub timeout_secs: u64,
    pub order_timeout_secs: u64,
    /// Requests per second
    pub rate_limit: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            access_key: None,
            secret_key: None,
            base_url: "https://api.upbit.com/v1".to_string(),
            quote_currency: "KRW".to_string(),
            timeout_secs: 5,
            order_timeout_secs: 10,
            rate_limit: 8,
        }
    }
}

impl ExchangeConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.access_key.clone().unwrap_or_default(),
            self.secret_key.clone().unwrap_or_default(),
        )
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_base_url(self.base_url.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_order_timeout(Duration::from_secs(self.order_timeout_secs))
            .with_rate_limit(self.rate_limit)
            .with_quote_currency(self.quote_currency.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Simulated fills against a local balance
    #[default]
    Paper,
    /// Real orders
    Live,
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Paper => f.write_str("PAPER"),
            TradingMode::Live => f.write_str("LIVE"),
        }
    }
}

/// Trading loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: TradingMode,
    /// IANA name of the trading-day timezone
    pub timezone: String,
    pub tick_interval_secs: u64,
    pub universe_refresh_minutes: i64,
    pub regime_refresh_minutes: i64,
    /// No re-entry into a symbol for this long after selling it
    pub sell_cooldown_minutes: i64,
    /// Symbols sized as tier L2; everything else is L1
    pub l2_symbols: Vec<String>,
    /// Paper account starting balance
    pub initial_balance: f64,
    pub hard_stop_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_stop_pct: f64,
    /// Paper exits only
    pub slippage_rate: f64,
    pub fee_rate: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            timezone: "Asia/Seoul".to_string(),
            tick_interval_secs: 60,
            universe_refresh_minutes: 60,
            regime_refresh_minutes: 60,
            sell_cooldown_minutes: 60,
            l2_symbols: Vec::new(),
            initial_balance: 10_000_000.0,
            hard_stop_pct: 0.015,
            take_profit_pct: 0.05,
            trailing_stop_pct: 0.03,
            slippage_rate: 0.001,
            fee_rate: 0.0005,
        }
    }
}

impl TradingConfig {
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid trading.timezone {:?}: {}", self.timezone, e))
    }

    /// `YYYY-MM-DD` of the trading day containing `now`. Names the daily
    /// log and ledger files.
    pub fn trading_date(&self, now: DateTime<Utc>) -> Result<String> {
        Ok(now.with_timezone(&self.timezone()?).format("%Y-%m-%d").to_string())
    }

    pub fn tier_for(&self, symbol: &Symbol) -> Tier {
        if self.l2_symbols.iter().any(|s| s == symbol.as_str()) {
            Tier::L2
        } else {
            Tier::L1
        }
    }
}
