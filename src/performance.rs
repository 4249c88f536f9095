use crate::models::{MetricSet, TradeRecord};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

const ANNUALIZATION_FACTOR: f64 = 252.0;

/// Weights for the composite grid-search score. Win rate is divided by 100
/// before weighting; every other metric is used at native scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub pnl: f64,
    pub sharpe: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            pnl: 1.0,
            sharpe: 1.0,
            win_rate: 1.0,
            profit_factor: 1.0,
            max_drawdown: -1.0,
        }
    }
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Computes the metric set for a flat list of closed trades, across one
    /// or more instruments. An empty list yields a fully missing set.
    pub fn metric_set(trades: &[TradeRecord]) -> MetricSet {
        if trades.is_empty() {
            return MetricSet::default();
        }

        let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
        ordered.sort_by(|a, b| a.exit_date.cmp(&b.exit_date));
        let pnls: Vec<f64> = ordered.iter().map(|trade| trade.pnl).collect();

        let total_pnl: f64 = pnls.iter().sum();
        let winners = pnls.iter().filter(|&&pnl| pnl > 0.0).count();
        let win_rate = winners as f64 / pnls.len() as f64 * 100.0;

        let gross_profit: f64 = pnls.iter().filter(|&&pnl| pnl > 0.0).sum();
        let gross_loss: f64 = -pnls.iter().filter(|&&pnl| pnl < 0.0).sum::<f64>();
        // No gross loss means an unbounded ratio, even when every pnl is
        // exactly zero.
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            f64::INFINITY
        };

        MetricSet {
            pnl: Some(total_pnl),
            sharpe: Some(Self::sharpe_ratio(&pnls)),
            win_rate: Some(win_rate),
            profit_factor: Some(profit_factor),
            max_drawdown: Some(Self::max_drawdown(&pnls)),
        }
    }

    /// Per-trade Sharpe ratio annualized by sqrt(252). Zero whenever the
    /// standard deviation is zero or undefined (fewer than two trades).
    fn sharpe_ratio(pnls: &[f64]) -> f64 {
        if pnls.len() < 2 {
            return 0.0;
        }

        let mean = pnls.iter().copied().mean();
        let std_dev = pnls.iter().copied().std_dev();
        if std_dev == 0.0 || !std_dev.is_finite() {
            return 0.0;
        }

        mean / std_dev * ANNUALIZATION_FACTOR.sqrt()
    }

    /// Largest peak-to-current decline of the cumulative pnl curve, with the
    /// trades already ordered by exit date.
    fn max_drawdown(pnls: &[f64]) -> f64 {
        let mut cumulative = 0.0;
        let mut peak = f64::NEG_INFINITY;
        let mut max_drawdown = 0.0;

        for pnl in pnls {
            cumulative += pnl;
            if cumulative > peak {
                peak = cumulative;
            }
            let drawdown = peak - cumulative;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }

        max_drawdown
    }

    /// Weighted linear combination of the metrics; missing metrics contribute
    /// zero rather than poisoning the score.
    pub fn composite_score(metrics: &MetricSet, weights: &ScoreWeights) -> f64 {
        weights.pnl * metrics.pnl.unwrap_or(0.0)
            + weights.sharpe * metrics.sharpe.unwrap_or(0.0)
            + weights.win_rate * metrics.win_rate.unwrap_or(0.0) / 100.0
            + weights.profit_factor * metrics.profit_factor.unwrap_or(0.0)
            + weights.max_drawdown * metrics.max_drawdown.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Direction;
    use chrono::{Duration, TimeZone, Utc};

    fn trade(pnl: f64, exit_offset: i64) -> TradeRecord {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        TradeRecord {
            symbol: "CL".to_string(),
            direction: Direction::Long,
            entry_date: base,
            exit_date: base + Duration::days(exit_offset),
            entry_price: 50.0,
            exit_price: 51.0,
            size: 1,
            pnl,
            holding_days: exit_offset,
        }
    }

    #[test]
    fn empty_trade_list_yields_missing_metrics() {
        let metrics = PerformanceCalculator::metric_set(&[]);
        assert!(metrics.is_missing());
    }

    #[test]
    fn profit_factor_is_infinite_without_losses() {
        let trades = vec![trade(10.0, 1), trade(5.0, 2), trade(3.0, 3)];
        let metrics = PerformanceCalculator::metric_set(&trades);
        assert_eq!(metrics.profit_factor, Some(f64::INFINITY));

        // Still unbounded when every trade nets exactly zero.
        let flat = vec![trade(0.0, 1), trade(0.0, 2)];
        let metrics = PerformanceCalculator::metric_set(&flat);
        assert_eq!(metrics.profit_factor, Some(f64::INFINITY));

        let mixed = vec![trade(10.0, 1), trade(-5.0, 2), trade(3.0, 3)];
        let metrics = PerformanceCalculator::metric_set(&mixed);
        let pf = metrics.profit_factor.unwrap();
        assert!(pf.is_finite() && pf > 0.0);
        assert!((pf - 13.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn sharpe_is_zero_with_zero_variance() {
        let trades = vec![trade(7.0, 1), trade(7.0, 2), trade(7.0, 3)];
        let metrics = PerformanceCalculator::metric_set(&trades);
        assert_eq!(metrics.sharpe, Some(0.0));

        let single = vec![trade(7.0, 1)];
        let metrics = PerformanceCalculator::metric_set(&single);
        assert_eq!(metrics.sharpe, Some(0.0));
    }

    #[test]
    fn drawdown_orders_trades_by_exit_date() {
        // In exit order the pnls are +10, -15, +5: peak 10, trough -5.
        let trades = vec![trade(5.0, 3), trade(10.0, 1), trade(-15.0, 2)];
        let metrics = PerformanceCalculator::metric_set(&trades);
        assert!((metrics.max_drawdown.unwrap() - 15.0).abs() < 1e-12);
        assert!((metrics.pnl.unwrap() - 0.0).abs() < 1e-12);
        let expected_win_rate = 2.0 / 3.0 * 100.0;
        assert!((metrics.win_rate.unwrap() - expected_win_rate).abs() < 1e-9);
    }

    #[test]
    fn composite_score_treats_missing_metrics_as_zero() {
        let metrics = MetricSet {
            pnl: Some(100.0),
            sharpe: None,
            win_rate: Some(50.0),
            profit_factor: Some(2.0),
            max_drawdown: Some(10.0),
        };
        let weights = ScoreWeights {
            pnl: 1.0,
            sharpe: 1.5,
            win_rate: 1.0,
            profit_factor: 1.0,
            max_drawdown: -2.0,
        };
        let score = PerformanceCalculator::composite_score(&metrics, &weights);
        assert!((score - 82.5).abs() < 1e-12);
    }
}
