use crate::bars::slice_range;
use crate::costs::CommissionModel;
use crate::engine::Engine;
use crate::models::{Instrument, ParameterSet, WalkForwardRow, Window};
use crate::strategy::{BreakoutConfig, BreakoutStrategy};
use anyhow::{anyhow, bail, Result};
use chrono::{Months, NaiveDate};
use log::info;
use std::collections::HashMap;

/// Rolling calendar windows: `train_years` of training followed by
/// `test_months` of out-of-sample data, the train start advancing by
/// `test_months` each step. Generation stops before any window whose train
/// or test boundary reaches `end`.
pub fn build_windows(
    start: NaiveDate,
    end: NaiveDate,
    train_years: u32,
    test_months: u32,
) -> Result<Vec<Window>> {
    if end <= start {
        bail!("end date {} must be after start date {}", end, start);
    }
    if train_years == 0 || test_months == 0 {
        bail!("train and test spans must both be at least one period");
    }

    let train_span = Months::new(train_years * 12);
    let test_span = Months::new(test_months);
    let mut windows = Vec::new();
    let mut train_start = start;

    loop {
        let train_end = train_start
            .checked_add_months(train_span)
            .ok_or_else(|| anyhow!("window arithmetic overflowed past {}", train_start))?;
        let test_end = train_end
            .checked_add_months(test_span)
            .ok_or_else(|| anyhow!("window arithmetic overflowed past {}", train_end))?;
        if train_end >= end || test_end >= end {
            break;
        }

        windows.push(Window {
            train_start,
            train_end,
            test_start: train_end,
            test_end,
        });
        train_start = train_start
            .checked_add_months(test_span)
            .ok_or_else(|| anyhow!("window arithmetic overflowed past {}", train_start))?;
    }

    Ok(windows)
}

pub struct WalkForwardRunner {
    pub initial_cash: f64,
    pub costs: CommissionModel,
}

impl WalkForwardRunner {
    /// Replays a fixed parameter set over each window's test span with a
    /// fresh strategy and account. Windows with no test bars for any
    /// instrument produce no row. The train spans exist for symmetry with
    /// the optimizing variant and are not traded here.
    pub fn run(
        &self,
        instruments: &[Instrument],
        params: &ParameterSet,
        multipliers: &HashMap<String, f64>,
        start: NaiveDate,
        end: NaiveDate,
        train_years: u32,
        test_months: u32,
    ) -> Result<Vec<WalkForwardRow>> {
        let config = BreakoutConfig::from_parameters(params, multipliers.clone());
        config.validate()?;

        let windows = build_windows(start, end, train_years, test_months)?;
        let mut rows = Vec::with_capacity(windows.len());

        for window in windows {
            // Both window ends are traded: a bar dated exactly test_end
            // belongs to this window (and to the start of the next).
            let test_slice = slice_range(instruments, window.test_start, window.test_end);
            if test_slice.is_empty() {
                info!(
                    "Skipping window {} to {}: no test bars for any instrument",
                    window.test_start, window.test_end
                );
                continue;
            }

            let mut strategy = BreakoutStrategy::new(config.clone());
            let engine = Engine::new(self.initial_cash, self.costs);
            let outcome = engine.run(&mut strategy, &test_slice)?;
            rows.push(WalkForwardRow {
                window,
                pnl: outcome.final_equity - self.initial_cash,
            });
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{TimeZone, Utc};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_span_includes_its_end_date() {
        // A single bar dated exactly on the first window's test_end. It
        // must land in that window's slice, and in the next window's too
        // since adjacent spans share their boundary day.
        let boundary = Utc.with_ymd_and_hms(2012, 7, 1, 0, 0, 0).unwrap();
        let instruments = vec![Instrument {
            symbol: "CL".to_string(),
            multiplier: 1000.0,
            bars: vec![Bar {
                date: boundary,
                open: 50.0,
                high: 50.5,
                low: 49.5,
                close: 50.0,
                volume: 1_000.0,
            }],
        }];

        let runner = WalkForwardRunner {
            initial_cash: 100_000.0,
            costs: CommissionModel::zero(),
        };
        let rows = runner
            .run(
                &instruments,
                &ParameterSet::new(),
                &HashMap::from([("CL".to_string(), 1000.0)]),
                date(2010, 1, 1),
                date(2015, 1, 1),
                2,
                6,
            )
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].window.test_end, date(2012, 7, 1));
        assert_eq!(rows[1].window.test_start, date(2012, 7, 1));
        assert_eq!(rows[0].pnl, 0.0);
    }

    #[test]
    fn windows_roll_forward_by_the_test_span() {
        let windows = build_windows(date(2010, 1, 1), date(2015, 1, 1), 2, 6).unwrap();
        assert_eq!(windows.len(), 5);

        let first = windows[0];
        assert_eq!(first.train_start, date(2010, 1, 1));
        assert_eq!(first.train_end, date(2012, 1, 1));
        assert_eq!(first.test_start, date(2012, 1, 1));
        assert_eq!(first.test_end, date(2012, 7, 1));

        assert_eq!(windows[1].train_start, date(2010, 7, 1));
        // A window whose test span would touch the end date is never built.
        let last = windows.last().unwrap();
        assert_eq!(last.test_end, date(2014, 7, 1));
        assert!(last.test_end < date(2015, 1, 1));
    }

    #[test]
    fn no_windows_fit_a_short_history() {
        let windows = build_windows(date(2010, 1, 1), date(2012, 6, 1), 2, 6).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn rejects_degenerate_spans_and_date_ranges() {
        assert!(build_windows(date(2015, 1, 1), date(2010, 1, 1), 2, 6).is_err());
        assert!(build_windows(date(2010, 1, 1), date(2015, 1, 1), 0, 6).is_err());
        assert!(build_windows(date(2010, 1, 1), date(2015, 1, 1), 2, 0).is_err());
    }
}
