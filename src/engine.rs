use crate::bars::unique_dates;
use crate::costs::CommissionModel;
use crate::models::{Instrument, OpenPosition, TradeRecord};
use crate::strategy::{Decision, Strategy};
use anyhow::{bail, Result};
use log::warn;
use std::collections::HashMap;

pub struct BacktestOutcome {
    pub final_equity: f64,
    pub records: Vec<TradeRecord>,
}

/// Chronological multi-instrument replay against a single cash account.
/// Fills happen at the close of the decision bar; accounting is futures
/// style, so entries only move cash by the entry commission and the whole
/// gross move lands on exit.
pub struct Engine {
    pub initial_cash: f64,
    pub costs: CommissionModel,
}

impl Engine {
    pub fn new(initial_cash: f64, costs: CommissionModel) -> Self {
        Self {
            initial_cash,
            costs,
        }
    }

    pub fn run<S: Strategy>(
        &self,
        strategy: &mut S,
        instruments: &[Instrument],
    ) -> Result<BacktestOutcome> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            bail!("initial cash must be positive, got {}", self.initial_cash);
        }

        let warmup = strategy.warmup_bars();
        let dates = unique_dates(instruments);
        let mut cursors: HashMap<&str, usize> = instruments
            .iter()
            .map(|instrument| (instrument.symbol.as_str(), 0))
            .collect();

        let mut cash = self.initial_cash;
        let mut positions: HashMap<String, OpenPosition> = HashMap::new();
        let mut records: Vec<TradeRecord> = Vec::new();

        for &current_date in &dates {
            // Instruments are visited in slice order on every date so that
            // cash contention resolves the same way run after run.
            for instrument in instruments {
                let cursor = cursors
                    .get_mut(instrument.symbol.as_str())
                    .ok_or_else(|| anyhow::anyhow!("cursor missing for {}", instrument.symbol))?;
                while *cursor < instrument.bars.len()
                    && instrument.bars[*cursor].date < current_date
                {
                    *cursor += 1;
                }
                if *cursor >= instrument.bars.len()
                    || instrument.bars[*cursor].date != current_date
                {
                    continue;
                }
                let index = *cursor;
                *cursor += 1;
                // The strategy never sees an instrument's warmup bars.
                if index < warmup {
                    continue;
                }

                let decision = strategy.decide(
                    &instrument.symbol,
                    &instrument.bars,
                    index,
                    positions.get(&instrument.symbol),
                    cash,
                );

                let close = instrument.bars[index].close;
                match decision {
                    Decision::Hold => {}
                    Decision::Enter { direction, size } => {
                        if positions.contains_key(&instrument.symbol) {
                            warn!(
                                "Ignoring entry for {} on {}: position already open",
                                instrument.symbol, current_date
                            );
                            continue;
                        }
                        if size <= 0 {
                            warn!(
                                "Ignoring entry for {} on {}: non-positive size {}",
                                instrument.symbol, current_date, size
                            );
                            continue;
                        }
                        cash -= self.costs.side(size);
                        positions.insert(
                            instrument.symbol.clone(),
                            OpenPosition {
                                direction,
                                size,
                                entry_price: close,
                                entry_date: current_date,
                            },
                        );
                    }
                    Decision::Exit => {
                        let Some(position) = positions.remove(&instrument.symbol) else {
                            warn!(
                                "Ignoring exit for {} on {}: no open position",
                                instrument.symbol, current_date
                            );
                            continue;
                        };
                        let gross = (close - position.entry_price)
                            * position.direction.sign()
                            * position.size as f64
                            * instrument.multiplier;
                        cash += gross - self.costs.side(position.size);

                        let record = TradeRecord {
                            symbol: instrument.symbol.clone(),
                            direction: position.direction,
                            entry_date: position.entry_date,
                            exit_date: current_date,
                            entry_price: position.entry_price,
                            exit_price: close,
                            size: position.size,
                            pnl: gross - self.costs.round_trip(position.size),
                            holding_days: (current_date.date_naive()
                                - position.entry_date.date_naive())
                            .num_days(),
                        };
                        strategy.on_trade_closed(&record);
                        records.push(record);
                    }
                }
            }
        }

        // Open positions stay open; equity marks them at the last close.
        let mut final_equity = cash;
        for instrument in instruments {
            if let (Some(position), Some(last)) =
                (positions.get(&instrument.symbol), instrument.bars.last())
            {
                final_equity += (last.close - position.entry_price)
                    * position.direction.sign()
                    * position.size as f64
                    * instrument.multiplier;
            }
        }

        Ok(BacktestOutcome {
            final_equity,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bar, Direction};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    struct ScriptedStrategy {
        // decision per (symbol, bar index)
        script: HashMap<(String, usize), Decision>,
        closed: Vec<TradeRecord>,
        warmup: usize,
    }

    impl ScriptedStrategy {
        fn new(script: Vec<(&str, usize, Decision)>) -> Self {
            Self {
                script: script
                    .into_iter()
                    .map(|(symbol, index, decision)| ((symbol.to_string(), index), decision))
                    .collect(),
                closed: Vec::new(),
                warmup: 0,
            }
        }

        fn with_warmup(mut self, warmup: usize) -> Self {
            self.warmup = warmup;
            self
        }
    }

    impl Strategy for ScriptedStrategy {
        fn decide(
            &mut self,
            symbol: &str,
            _bars: &[Bar],
            index: usize,
            _position: Option<&OpenPosition>,
            _available_cash: f64,
        ) -> Decision {
            self.script
                .get(&(symbol.to_string(), index))
                .copied()
                .unwrap_or(Decision::Hold)
        }

        fn on_trade_closed(&mut self, record: &TradeRecord) {
            self.closed.push(record.clone());
        }

        fn warmup_bars(&self) -> usize {
            self.warmup
        }
    }

    fn bar(date: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            date,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000.0,
        }
    }

    fn instrument(symbol: &str, multiplier: f64, closes: &[f64]) -> Instrument {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Instrument {
            symbol: symbol.to_string(),
            multiplier,
            bars: closes
                .iter()
                .enumerate()
                .map(|(i, &close)| bar(base + Duration::days(i as i64), close))
                .collect(),
        }
    }

    #[test]
    fn round_trip_books_gross_minus_commissions() {
        let engine = Engine::new(100_000.0, CommissionModel { per_contract: 2.5 });
        let instruments = vec![instrument("CL", 1000.0, &[50.0, 51.0, 52.0])];
        let mut strategy = ScriptedStrategy::new(vec![
            (
                "CL",
                0,
                Decision::Enter {
                    direction: Direction::Long,
                    size: 2,
                },
            ),
            ("CL", 2, Decision::Exit),
        ]);

        let outcome = engine.run(&mut strategy, &instruments).unwrap();
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        // gross = (52 - 50) * 2 * 1000 = 4000, commissions = 2 * 2 * 2.5 = 10
        assert!((record.pnl - 3_990.0).abs() < 1e-9);
        assert_eq!(record.size, 2);
        assert_eq!(record.holding_days, 2);
        assert!((outcome.final_equity - 103_990.0).abs() < 1e-9);
        assert_eq!(strategy.closed.len(), 1);
    }

    #[test]
    fn short_trades_profit_from_falling_prices() {
        let engine = Engine::new(50_000.0, CommissionModel::zero());
        let instruments = vec![instrument("GC", 100.0, &[1800.0, 1790.0, 1780.0])];
        let mut strategy = ScriptedStrategy::new(vec![
            (
                "GC",
                0,
                Decision::Enter {
                    direction: Direction::Short,
                    size: 1,
                },
            ),
            ("GC", 2, Decision::Exit),
        ]);

        let outcome = engine.run(&mut strategy, &instruments).unwrap();
        assert!((outcome.records[0].pnl - 2_000.0).abs() < 1e-9);
        assert!((outcome.final_equity - 52_000.0).abs() < 1e-9);
    }

    #[test]
    fn open_position_is_marked_to_market_in_final_equity() {
        let engine = Engine::new(10_000.0, CommissionModel { per_contract: 2.5 });
        let instruments = vec![instrument("CL", 1000.0, &[50.0, 51.0])];
        let mut strategy = ScriptedStrategy::new(vec![(
            "CL",
            0,
            Decision::Enter {
                direction: Direction::Long,
                size: 1,
            },
        )]);

        let outcome = engine.run(&mut strategy, &instruments).unwrap();
        assert!(outcome.records.is_empty());
        // cash after entry commission: 9997.5, unrealized: (51-50)*1000
        assert!((outcome.final_equity - 10_997.5).abs() < 1e-9);
    }

    #[test]
    fn instruments_replay_in_date_order_with_gaps() {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        // GC misses day 1; its cursor must skip ahead cleanly.
        let gc = Instrument {
            symbol: "GC".to_string(),
            multiplier: 100.0,
            bars: vec![bar(base, 1800.0), bar(base + Duration::days(2), 1810.0)],
        };
        let cl = instrument("CL", 1000.0, &[50.0, 51.0, 52.0]);

        let engine = Engine::new(100_000.0, CommissionModel::zero());
        let mut strategy = ScriptedStrategy::new(vec![
            (
                "GC",
                0,
                Decision::Enter {
                    direction: Direction::Long,
                    size: 1,
                },
            ),
            ("GC", 1, Decision::Exit),
            (
                "CL",
                1,
                Decision::Enter {
                    direction: Direction::Long,
                    size: 1,
                },
            ),
            ("CL", 2, Decision::Exit),
        ]);

        let outcome = engine.run(&mut strategy, &[cl, gc]).unwrap();
        assert_eq!(outcome.records.len(), 2);
        // Exit order follows the calendar: CL closes on day 2 before GC's
        // same-day bar only because CL comes first in instrument order.
        assert_eq!(outcome.records[0].symbol, "CL");
        assert_eq!(outcome.records[1].symbol, "GC");
        let total: f64 = outcome.records.iter().map(|r| r.pnl).sum();
        assert!((outcome.final_equity - (100_000.0 + total)).abs() < 1e-9);
    }

    #[test]
    fn warmup_bars_are_never_offered_to_the_strategy() {
        let engine = Engine::new(100_000.0, CommissionModel::zero());
        let instruments = vec![instrument("CL", 1000.0, &[50.0, 51.0, 52.0, 53.0])];
        // The scripted entry sits inside the warmup span, so the engine
        // must never ask for it.
        let mut strategy = ScriptedStrategy::new(vec![(
            "CL",
            1,
            Decision::Enter {
                direction: Direction::Long,
                size: 1,
            },
        )])
        .with_warmup(2);

        let outcome = engine.run(&mut strategy, &instruments).unwrap();
        assert!(outcome.records.is_empty());
        assert!((outcome.final_equity - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_initial_cash() {
        let engine = Engine::new(0.0, CommissionModel::zero());
        let mut strategy = ScriptedStrategy::new(vec![]);
        assert!(engine.run(&mut strategy, &[]).is_err());
    }
}
