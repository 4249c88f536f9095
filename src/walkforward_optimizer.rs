use crate::bars::slice_range;
use crate::costs::CommissionModel;
use crate::engine::Engine;
use crate::models::{Instrument, ParameterSet, WalkForwardOptRow};
use crate::optimizer::{GridSearchOptimizer, ParameterGrid};
use crate::param_utils::format_parameters;
use crate::performance::ScoreWeights;
use crate::strategy::{BreakoutConfig, BreakoutStrategy};
use crate::walkforward::build_windows;
use anyhow::Result;
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub struct WalkForwardOptimizer {
    pub initial_cash: f64,
    pub costs: CommissionModel,
    pub multipliers: HashMap<String, f64>,
    pub weights: ScoreWeights,
}

impl WalkForwardOptimizer {
    /// For each window, grid-searches the train span, picks the candidate
    /// with the highest train pnl and replays it out-of-sample on the test
    /// span. Every window gets a row; windows where no candidate produced a
    /// usable pnl carry `None` throughout.
    pub fn run(
        &self,
        instruments: &[Instrument],
        base: &ParameterSet,
        grid: &ParameterGrid,
        start: NaiveDate,
        end: NaiveDate,
        train_years: u32,
        test_months: u32,
    ) -> Result<Vec<WalkForwardOptRow>> {
        let windows = build_windows(start, end, train_years, test_months)?;
        let optimizer = GridSearchOptimizer {
            initial_cash: self.initial_cash,
            costs: self.costs,
            multipliers: self.multipliers.clone(),
            weights: self.weights,
            deadline: None,
        };

        let mut rows = Vec::with_capacity(windows.len());
        for window in windows {
            // End dates are inclusive, so the boundary bar is shared by the
            // train span and the test span that follows it.
            let train_slice =
                Arc::new(slice_range(instruments, window.train_start, window.train_end));
            let test_slice = slice_range(instruments, window.test_start, window.test_end);

            info!(
                "Optimizing window train [{}, {}] test [{}, {}]",
                window.train_start, window.train_end, window.test_start, window.test_end
            );

            let train_rows = optimizer.evaluate_grid(train_slice, base, grid)?;
            let mut best: Option<(ParameterSet, f64)> = None;
            for row in &train_rows {
                let Some(pnl) = row.metrics.pnl else { continue };
                let improved = match &best {
                    Some((_, best_pnl)) => pnl > *best_pnl,
                    None => true,
                };
                if improved {
                    best = Some((row.params.clone(), pnl));
                }
            }

            let Some((best_params, train_pnl)) = best else {
                warn!(
                    "No usable candidate for window starting {}; emitting empty row",
                    window.train_start
                );
                rows.push(WalkForwardOptRow {
                    window,
                    best_params: None,
                    train_pnl: None,
                    test_pnl: None,
                });
                continue;
            };

            let test_pnl = self.replay_test_span(&test_slice, &best_params);
            rows.push(WalkForwardOptRow {
                window,
                best_params: Some(best_params),
                train_pnl: Some(train_pnl),
                test_pnl,
            });
        }

        Ok(rows)
    }

    fn replay_test_span(&self, test_slice: &[Instrument], params: &ParameterSet) -> Option<f64> {
        let config = BreakoutConfig::from_parameters(params, self.multipliers.clone());
        let mut strategy = BreakoutStrategy::new(config);
        let engine = Engine::new(self.initial_cash, self.costs);
        match engine.run(&mut strategy, test_slice) {
            Ok(outcome) => Some(outcome.final_equity - self.initial_cash),
            Err(error) => {
                warn!(
                    "Test replay failed for [{}]: {}",
                    format_parameters(params),
                    error
                );
                None
            }
        }
    }
}
