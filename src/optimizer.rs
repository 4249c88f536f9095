use crate::costs::CommissionModel;
use crate::engine::Engine;
use crate::models::{GridRow, GridTask, GridTaskResult, Instrument, MetricSet, ParameterSet};
use crate::param_utils::format_parameters;
use crate::performance::{PerformanceCalculator, ScoreWeights};
use crate::strategy::{BreakoutConfig, BreakoutStrategy};
use anyhow::{bail, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Named parameter axes in declaration order. Expansion is a cartesian
/// product with the last axis varying fastest, so results land in a stable,
/// predictable order.
#[derive(Debug, Clone)]
pub struct ParameterGrid {
    axes: Vec<(String, Vec<f64>)>,
}

impl ParameterGrid {
    pub fn new(axes: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if axes.is_empty() {
            bail!("parameter grid needs at least one axis");
        }
        for (i, (name, values)) in axes.iter().enumerate() {
            if name.trim().is_empty() {
                bail!("parameter axis {} has an empty name", i);
            }
            if values.is_empty() {
                bail!("parameter axis '{}' has no values", name);
            }
            if values.iter().any(|value| !value.is_finite()) {
                bail!("parameter axis '{}' contains a non-finite value", name);
            }
            if axes[..i].iter().any(|(earlier, _)| earlier == name) {
                bail!("parameter axis '{}' is declared twice", name);
            }
        }
        Ok(Self { axes })
    }

    pub fn len(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, odometer style: the last axis ticks on every step,
    /// the first axis ticks last.
    pub fn expand(&self) -> Vec<ParameterSet> {
        let total = self.len();
        let mut combinations = Vec::with_capacity(total);
        let mut indices = vec![0usize; self.axes.len()];

        for _ in 0..total {
            let params: ParameterSet = self
                .axes
                .iter()
                .zip(&indices)
                .map(|((name, values), &i)| (name.clone(), values[i]))
                .collect();
            combinations.push(params);

            for axis in (0..self.axes.len()).rev() {
                indices[axis] += 1;
                if indices[axis] < self.axes[axis].1.len() {
                    break;
                }
                indices[axis] = 0;
            }
        }

        combinations
    }
}

pub struct GridSearchOptimizer {
    pub initial_cash: f64,
    pub costs: CommissionModel,
    pub multipliers: HashMap<String, f64>,
    pub weights: ScoreWeights,
    /// Per-evaluation wall-clock budget. Evaluations that overrun it are
    /// reported as failed rows instead of results.
    pub deadline: Option<Duration>,
}

impl GridSearchOptimizer {
    /// Backtests every combination in `base` overlaid with each grid point,
    /// fanned out over a worker pool. The returned rows are in grid
    /// enumeration order; a failed or trade-less evaluation yields a row
    /// with missing metrics rather than aborting the sweep.
    pub fn evaluate_grid(
        &self,
        instruments: Arc<Vec<Instrument>>,
        base: &ParameterSet,
        grid: &ParameterGrid,
    ) -> Result<Vec<GridRow>> {
        let combinations = grid.expand();
        let total = combinations.len();
        if total == 0 {
            bail!("parameter grid expanded to zero combinations");
        }

        let num_workers = std::cmp::min(total, std::cmp::max(1, num_cpus::get()));
        debug!("Using {} worker threads for {} evaluations", num_workers, total);

        let (task_tx, task_rx): (Sender<GridTask>, Receiver<GridTask>) = bounded(total);
        let (result_tx, result_rx): (Sender<GridTaskResult>, Receiver<GridTaskResult>) =
            bounded(total);

        let mut handles = Vec::new();
        for _ in 0..num_workers {
            let rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let instruments = instruments.clone();
            let initial_cash = self.initial_cash;
            let costs = self.costs;
            let multipliers = self.multipliers.clone();
            let deadline = self.deadline;

            let handle = thread::spawn(move || {
                while let Ok(task) = rx.recv() {
                    let start = Instant::now();
                    let evaluated = Self::evaluate_single(
                        &instruments,
                        initial_cash,
                        costs,
                        &multipliers,
                        &task.params,
                    );
                    let elapsed = start.elapsed();

                    let result = match evaluated {
                        Ok(_) if deadline.is_some_and(|limit| elapsed > limit) => {
                            GridTaskResult {
                                index: task.index,
                                metrics: MetricSet::default(),
                                error: Some(format!(
                                    "evaluation exceeded deadline ({:.1}s)",
                                    elapsed.as_secs_f64()
                                )),
                            }
                        }
                        Ok(metrics) => GridTaskResult {
                            index: task.index,
                            metrics,
                            error: None,
                        },
                        Err(error) => {
                            warn!(
                                "Evaluation failed for [{}]: {}",
                                format_parameters(&task.params),
                                error
                            );
                            GridTaskResult {
                                index: task.index,
                                metrics: MetricSet::default(),
                                error: Some(error.to_string()),
                            }
                        }
                    };

                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }

        let mut merged_sets = Vec::with_capacity(total);
        for (index, point) in combinations.into_iter().enumerate() {
            let mut params = base.clone();
            params.extend(point);
            merged_sets.push(params.clone());
            task_tx.send(GridTask { index, params })?;
        }
        drop(task_tx);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut slots: Vec<Option<GridTaskResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;
        while completed < total {
            match result_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(result) => {
                    completed += 1;
                    pb.set_position(completed as u64);
                    let index = result.index;
                    slots[index] = Some(result);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    warn!("Result channel closed unexpectedly. Some results may be lost.");
                    break;
                }
            }
        }
        pb.finish_and_clear();

        for handle in handles {
            let _ = handle.join();
        }

        let mut rows = Vec::with_capacity(total);
        for (index, (slot, params)) in slots.into_iter().zip(merged_sets).enumerate() {
            let result = slot.unwrap_or_else(|| GridTaskResult {
                index,
                metrics: MetricSet::default(),
                error: Some("worker produced no result".to_string()),
            });
            let score = PerformanceCalculator::composite_score(&result.metrics, &self.weights);
            rows.push(GridRow {
                index,
                params,
                metrics: result.metrics,
                score,
                error: result.error,
            });
        }

        Ok(rows)
    }

    /// Full sweep sorted best-first by composite score. Ties keep grid
    /// enumeration order.
    pub fn run(
        &self,
        instruments: Arc<Vec<Instrument>>,
        base: &ParameterSet,
        grid: &ParameterGrid,
    ) -> Result<Vec<GridRow>> {
        let mut rows = self.evaluate_grid(instruments, base, grid)?;
        rows.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });

        let failures = rows.iter().filter(|row| row.error.is_some()).count();
        if failures > 0 {
            warn!("Grid search finished with {} failed evaluations", failures);
        } else {
            info!("Grid search finished: {} evaluations", rows.len());
        }
        Ok(rows)
    }

    fn evaluate_single(
        instruments: &[Instrument],
        initial_cash: f64,
        costs: CommissionModel,
        multipliers: &HashMap<String, f64>,
        params: &ParameterSet,
    ) -> Result<MetricSet> {
        let config = BreakoutConfig::from_parameters(params, multipliers.clone());
        config.validate()?;

        let mut strategy = BreakoutStrategy::new(config);
        let engine = Engine::new(initial_cash, costs);
        let outcome = engine.run(&mut strategy, instruments)?;
        let mut metrics = PerformanceCalculator::metric_set(&outcome.records);
        // Pnl is equity-based so a position still open at range end counts
        // at its last mark, not just the closed trades.
        if !outcome.records.is_empty() {
            metrics.pnl = Some(outcome.final_equity - initial_cash);
        }
        Ok(metrics)
    }
}
