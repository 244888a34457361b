//! Closed-trade ledger
//!
//! Append-only CSV, one row per closed trade. The file is created with a
//! header on first write and can be read back for reporting.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::{Money, RegimeType, Tier};

pub const LEDGER_COLUMNS: [&str; 13] = [
    "timestamp",
    "symbol",
    "strategy",
    "tier",
    "regime",
    "side",
    "size",
    "entry_price",
    "exit_price",
    "gross_pnl_pct",
    "net_pnl_pct",
    "fees_slippage",
    "reason",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("reports"),
        }
    }
}

/// `{dir}/trades_{run_id}.csv`, or `{dir}/trades_{date}.csv` without a run id
pub fn ledger_path(dir: impl AsRef<Path>, run_id: Option<&str>, date: &str) -> PathBuf {
    let name = match run_id {
        Some(id) => format!("trades_{}.csv", id),
        None => format!("trades_{}.csv", date),
    };
    dir.as_ref().join(name)
}

mod local_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)
    }
}

/// One closed trade. Percentages are fractions, timestamps local wall time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(with = "local_time")]
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub strategy: String,
    pub tier: Tier,
    pub regime: RegimeType,
    pub side: String,
    /// Entry notional
    pub size: Money,
    pub entry_price: f64,
    pub exit_price: f64,
    pub gross_pnl_pct: f64,
    pub net_pnl_pct: f64,
    /// Quote-currency difference between the mid-price exit and net proceeds
    pub fees_slippage: Money,
    pub reason: String,
}

impl TradeRecord {
    pub fn net_pnl_value(&self) -> f64 {
        self.size.to_f64() * self.net_pnl_pct
    }

    pub fn gross_pnl_value(&self) -> f64 {
        self.size.to_f64() * self.gross_pnl_pct
    }
}

#[derive(Debug, Clone)]
pub struct TradeLedger {
    path: PathBuf,
}

impl TradeLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or empty
    pub fn append(&self, record: &TradeRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(record)
            .context("Failed to write ledger row")?;
        writer.flush().context("Failed to flush ledger")?;
        Ok(())
    }
}

/// Load every row of a ledger file
pub fn read_ledger(path: impl AsRef<Path>) -> Result<Vec<TradeRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open ledger {}", path.display()))?;

    let mut records = Vec::new();
    for (row_idx, result) in reader.deserialize().enumerate() {
        let record: TradeRecord =
            result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(symbol: &str, net: f64) -> TradeRecord {
        TradeRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 5, 2)
                .unwrap()
                .and_hms_opt(10, 15, 0)
                .unwrap(),
            symbol: symbol.to_string(),
            strategy: "VOLTX_DIP".to_string(),
            tier: Tier::L1,
            regime: RegimeType::Flat,
            side: "long".to_string(),
            size: Money::new(dec!(300000)),
            entry_price: 100.0,
            exit_price: 105.0,
            gross_pnl_pct: 0.05,
            net_pnl_pct: net,
            fees_slippage: Money::new(dec!(472.5)),
            reason: "TP: +5.0%, target hit".to_string(),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("voltx_ledger_{}_{}", name, uuid::Uuid::new_v4()))
            .join("trades.csv")
    }

    #[test]
    fn test_ledger_path() {
        assert_eq!(
            ledger_path("reports", Some("r1"), "2024-05-02"),
            PathBuf::from("reports/trades_r1.csv")
        );
        assert_eq!(
            ledger_path("reports", None, "2024-05-02"),
            PathBuf::from("reports/trades_2024-05-02.csv")
        );
    }

    #[test]
    fn test_append_writes_single_header() {
        let path = temp_path("header");
        let ledger = TradeLedger::new(&path);
        ledger.append(&record("KRW-ETH", 0.0485)).unwrap();
        ledger.append(&record("KRW-SOL", -0.0165)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LEDGER_COLUMNS.join(","));
        assert!(lines[1].starts_with("2024-05-02 10:15:00,KRW-ETH,VOLTX_DIP,L1,FLAT,long,300000,"));
        // Comma in the reason is quoted
        assert!(lines[1].ends_with("\"TP: +5.0%, target hit\""));

        let records = read_ledger(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].symbol, "KRW-SOL");
        assert_eq!(records[1].fees_slippage, Money::new(dec!(472.5)));
        assert!((records[0].net_pnl_value() - 14_550.0).abs() < 1e-6);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
