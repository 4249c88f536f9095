use crate::models::{Bar, Direction, OpenPosition, ParameterSet, TradeRecord};
use crate::param_utils::{get_param, get_usize_param_min};
use crate::strategy::{Decision, Strategy};
use anyhow::{bail, Result};
use std::collections::HashMap;

/// Donchian-style breakout parameters. `multipliers` maps each symbol to its
/// contract multiplier; symbols without an entry default to 1.0.
#[derive(Debug, Clone)]
pub struct BreakoutConfig {
    pub breakout_window: usize,
    pub trailing_stop_pct: f64,
    pub risk_per_trade: f64,
    pub multipliers: HashMap<String, f64>,
}

impl BreakoutConfig {
    pub fn from_parameters(params: &ParameterSet, multipliers: HashMap<String, f64>) -> Self {
        Self {
            breakout_window: get_usize_param_min(params, "breakout_window", 20, 1),
            trailing_stop_pct: get_param(params, "trailing_stop_pct", 0.05),
            risk_per_trade: get_param(params, "risk_per_trade", 0.01),
            multipliers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.breakout_window == 0 {
            bail!("breakout_window must be at least 1");
        }
        if !self.trailing_stop_pct.is_finite()
            || self.trailing_stop_pct <= 0.0
            || self.trailing_stop_pct >= 1.0
        {
            bail!(
                "trailing_stop_pct must be in (0, 1), got {}",
                self.trailing_stop_pct
            );
        }
        if !self.risk_per_trade.is_finite()
            || self.risk_per_trade <= 0.0
            || self.risk_per_trade > 1.0
        {
            bail!(
                "risk_per_trade must be in (0, 1], got {}",
                self.risk_per_trade
            );
        }
        for (symbol, multiplier) in &self.multipliers {
            if !multiplier.is_finite() || *multiplier <= 0.0 {
                bail!("contract multiplier for {} must be positive", symbol);
            }
        }
        Ok(())
    }

    fn multiplier(&self, symbol: &str) -> f64 {
        self.multipliers.get(symbol).copied().unwrap_or(1.0)
    }
}

/// Per-symbol stop bookkeeping while a position is open. The entry price is
/// duplicated here because the trailing stop only starts ratcheting once the
/// close has moved past it in the trade's favor.
#[derive(Debug, Clone)]
struct TradeState {
    direction: Direction,
    entry_price: f64,
    hard_stop: f64,
    trailing_stop: f64,
}

pub struct BreakoutStrategy {
    config: BreakoutConfig,
    states: HashMap<String, TradeState>,
    trade_log: HashMap<String, Vec<TradeRecord>>,
}

impl BreakoutStrategy {
    pub fn new(config: BreakoutConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            trade_log: HashMap::new(),
        }
    }

    /// Closed trades keyed by symbol, in closing order. Consumes the log.
    pub fn take_trade_log(&mut self) -> HashMap<String, Vec<TradeRecord>> {
        std::mem::take(&mut self.trade_log)
    }

    /// Highest high and lowest low over the `breakout_window` bars strictly
    /// before `index`. The current bar never feeds its own levels.
    fn breakout_levels(&self, bars: &[Bar], index: usize) -> Option<(f64, f64)> {
        let window = self.config.breakout_window;
        if index < window {
            return None;
        }
        let lookback = &bars[index - window..index];
        let high = lookback.iter().map(|bar| bar.high).fold(f64::MIN, f64::max);
        let low = lookback.iter().map(|bar| bar.low).fold(f64::MAX, f64::min);
        Some((high, low))
    }

    fn plan_entry(
        &mut self,
        symbol: &str,
        close: f64,
        prior_high: f64,
        prior_low: f64,
        available_cash: f64,
    ) -> Decision {
        let (direction, hard_stop) = if close > prior_high {
            (Direction::Long, prior_low)
        } else if close < prior_low {
            (Direction::Short, prior_high)
        } else {
            return Decision::Hold;
        };

        let risk_per_unit = (close - hard_stop).abs();
        if risk_per_unit <= 0.0 {
            return Decision::Hold;
        }

        let budget = available_cash * self.config.risk_per_trade;
        let size = (budget / (risk_per_unit * self.config.multiplier(symbol))).floor() as i64;
        if size <= 0 {
            return Decision::Hold;
        }

        let trailing_stop = close * (1.0 - direction.sign() * self.config.trailing_stop_pct);
        self.states.insert(
            symbol.to_string(),
            TradeState {
                direction,
                entry_price: close,
                hard_stop,
                trailing_stop,
            },
        );
        Decision::Enter { direction, size }
    }

    /// Ratchets the trailing stop, then checks trailing before the hard stop.
    fn manage(&mut self, symbol: &str, close: f64) -> Decision {
        let state = match self.states.get_mut(symbol) {
            Some(state) => state,
            None => return Decision::Hold,
        };

        match state.direction {
            Direction::Long => {
                if close > state.entry_price {
                    let candidate = close * (1.0 - self.config.trailing_stop_pct);
                    state.trailing_stop = state.trailing_stop.max(candidate);
                }
                if close <= state.trailing_stop || close <= state.hard_stop {
                    return Decision::Exit;
                }
            }
            Direction::Short => {
                if close < state.entry_price {
                    let candidate = close * (1.0 + self.config.trailing_stop_pct);
                    state.trailing_stop = state.trailing_stop.min(candidate);
                }
                if close >= state.trailing_stop || close >= state.hard_stop {
                    return Decision::Exit;
                }
            }
        }

        Decision::Hold
    }
}

impl Strategy for BreakoutStrategy {
    fn decide(
        &mut self,
        symbol: &str,
        bars: &[Bar],
        index: usize,
        position: Option<&OpenPosition>,
        available_cash: f64,
    ) -> Decision {
        let close = bars[index].close;

        if position.is_some() {
            return self.manage(symbol, close);
        }

        // An entry decision the engine rejected would leave stale stops.
        self.states.remove(symbol);

        match self.breakout_levels(bars, index) {
            Some((prior_high, prior_low)) => {
                self.plan_entry(symbol, close, prior_high, prior_low, available_cash)
            }
            None => Decision::Hold,
        }
    }

    fn on_trade_closed(&mut self, record: &TradeRecord) {
        self.states.remove(&record.symbol);
        self.trade_log
            .entry(record.symbol.clone())
            .or_default()
            .push(record.clone());
    }

    fn warmup_bars(&self) -> usize {
        self.config.breakout_window
    }
}
