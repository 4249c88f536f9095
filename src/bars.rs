use crate::models::{Bar, Instrument};
use chrono::{DateTime, NaiveDate, Utc};

/// Drops bars with non-finite fields, sorts by date and removes duplicate
/// dates keeping the first occurrence. The result has strictly increasing
/// dates by construction.
pub fn sanitize_bars(bars: Vec<Bar>) -> Vec<Bar> {
    let mut cleaned: Vec<Bar> = bars.into_iter().filter(|bar| bar.is_finite()).collect();
    cleaned.sort_by(|a, b| a.date.cmp(&b.date));
    cleaned.dedup_by(|later, earlier| later.date == earlier.date);
    cleaned
}

/// Restricts every instrument to bars inside `[start, end]`, inclusive on
/// both ends. Instruments left with no bars are dropped entirely.
pub fn slice_range(instruments: &[Instrument], start: NaiveDate, end: NaiveDate) -> Vec<Instrument> {
    instruments
        .iter()
        .filter_map(|instrument| {
            let bars: Vec<Bar> = instrument
                .bars
                .iter()
                .filter(|bar| {
                    let day = bar.date.date_naive();
                    day >= start && day <= end
                })
                .cloned()
                .collect();
            if bars.is_empty() {
                None
            } else {
                Some(Instrument {
                    symbol: instrument.symbol.clone(),
                    multiplier: instrument.multiplier,
                    bars,
                })
            }
        })
        .collect()
}

/// Sorted union of all bar dates across instruments.
pub fn unique_dates(instruments: &[Instrument]) -> Vec<DateTime<Utc>> {
    let mut dates: Vec<DateTime<Utc>> = instruments
        .iter()
        .flat_map(|instrument| instrument.bars.iter().map(|bar| bar.date))
        .collect();
    dates.sort();
    dates.dedup();
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bar(date: DateTime<Utc>, close: f64) -> Bar {
        Bar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn sanitize_drops_bad_rows_and_duplicate_dates() {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut bad = bar(base + Duration::days(1), 10.0);
        bad.close = f64::NAN;
        let bars = vec![
            bar(base + Duration::days(2), 12.0),
            bar(base, 10.0),
            bad,
            bar(base, 99.0),
        ];

        let cleaned = sanitize_bars(bars);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].date, base);
        assert!((cleaned[0].close - 10.0).abs() < 1e-12);
        assert!(cleaned.windows(2).all(|pair| pair[0].date < pair[1].date));
    }

    #[test]
    fn slice_range_is_inclusive_and_drops_empty_instruments() {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let instruments = vec![
            Instrument {
                symbol: "CL".to_string(),
                multiplier: 1000.0,
                bars: (0..10).map(|i| bar(base + Duration::days(i), 50.0)).collect(),
            },
            Instrument {
                symbol: "GC".to_string(),
                multiplier: 100.0,
                bars: vec![bar(base + Duration::days(30), 1800.0)],
            },
        ];

        let start = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
        let sliced = slice_range(&instruments, start, end);
        assert_eq!(sliced.len(), 1);
        assert_eq!(sliced[0].symbol, "CL");
        assert_eq!(sliced[0].bars.len(), 3);
    }

    #[test]
    fn unique_dates_merges_across_instruments() {
        let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let instruments = vec![
            Instrument {
                symbol: "A".to_string(),
                multiplier: 1.0,
                bars: vec![bar(base, 1.0), bar(base + Duration::days(2), 1.0)],
            },
            Instrument {
                symbol: "B".to_string(),
                multiplier: 1.0,
                bars: vec![bar(base + Duration::days(1), 1.0), bar(base + Duration::days(2), 1.0)],
            },
        ];

        let dates = unique_dates(&instruments);
        assert_eq!(dates.len(), 3);
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
