use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite()
    }
}

/// One tradable series: a symbol, its ordered daily bars and the contract
/// multiplier converting price-unit moves into currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub multiplier: f64,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// +1 for long, -1 for short; the sign applied to price moves.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Immutable record of a closed trade. `pnl` is commission-adjusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub direction: Direction,
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: i64,
    pub pnl: f64,
    pub holding_days: i64,
}

/// Parameter name -> value map, the unit of work for grid searches.
pub type ParameterSet = HashMap<String, f64>;

/// A live position as the engine tracks it between entry and exit fills.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub direction: Direction,
    pub size: i64,
    pub entry_price: f64,
    pub entry_date: DateTime<Utc>,
}

/// One walk-forward window. `test_start` always equals `train_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

/// Per-run metric summary. Every metric is individually nullable so that a
/// run with no trades yields a fully missing set instead of a crash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub pnl: Option<f64>,
    pub sharpe: Option<f64>,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub max_drawdown: Option<f64>,
}

impl MetricSet {
    pub fn is_missing(&self) -> bool {
        self.pnl.is_none()
            && self.sharpe.is_none()
            && self.win_rate.is_none()
            && self.profit_factor.is_none()
            && self.max_drawdown.is_none()
    }
}

/// One row of a grid-search result table. `index` is the position of the
/// parameter set in enumeration order and breaks score ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRow {
    pub index: usize,
    pub params: ParameterSet,
    pub metrics: MetricSet,
    pub score: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardRow {
    pub window: Window,
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardOptRow {
    pub window: Window,
    pub best_params: Option<ParameterSet>,
    pub train_pnl: Option<f64>,
    pub test_pnl: Option<f64>,
}

// Worker communication structures
#[derive(Debug, Clone)]
pub struct GridTask {
    pub index: usize,
    pub params: ParameterSet,
}

#[derive(Debug)]
pub struct GridTaskResult {
    pub index: usize,
    pub metrics: MetricSet,
    pub error: Option<String>,
}
