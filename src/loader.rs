use crate::bars::sanitize_bars;
use crate::config::SymbolSpec;
use crate::models::{Bar, Instrument};
use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use log::{info, warn};
use std::path::Path;

/// Loads `<data_dir>/<symbol>.csv` for every configured symbol. Files carry
/// a header row of `date,open,high,low,close,volume` with dates formatted
/// `%Y-%m-%d`. Unparseable rows are dropped with a warning; an empty result
/// for any symbol is an error.
pub fn load_instruments(data_dir: &Path, symbols: &[SymbolSpec]) -> Result<Vec<Instrument>> {
    let mut instruments = Vec::with_capacity(symbols.len());
    for spec in symbols {
        let path = data_dir.join(format!("{}.csv", spec.symbol));
        let bars = load_bars_from_csv(&path)?;
        if bars.is_empty() {
            bail!("no usable bars in {}", path.display());
        }
        info!("Loaded {} bars for {}", bars.len(), spec.symbol);
        instruments.push(Instrument {
            symbol: spec.symbol.clone(),
            multiplier: spec.contract_multiplier,
            bars,
        });
    }
    Ok(instruments)
}

fn load_bars_from_csv(path: &Path) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open csv: {}", path.display()))?;

    let mut bars = Vec::new();
    let mut dropped = 0usize;
    for (line, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(_) => {
                dropped += 1;
                continue;
            }
        };
        let date = record
            .get(0)
            .and_then(|field| NaiveDate::parse_from_str(field, "%Y-%m-%d").ok())
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive));
        let open = record.get(1).and_then(|field| field.parse::<f64>().ok());
        let high = record.get(2).and_then(|field| field.parse::<f64>().ok());
        let low = record.get(3).and_then(|field| field.parse::<f64>().ok());
        let close = record.get(4).and_then(|field| field.parse::<f64>().ok());
        let volume = record
            .get(5)
            .and_then(|field| field.parse::<f64>().ok())
            .unwrap_or(0.0);

        if let (Some(date), Some(open), Some(high), Some(low), Some(close)) =
            (date, open, high, low, close)
        {
            bars.push(Bar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        } else {
            dropped += 1;
            warn!("Dropping malformed row {} in {}", line + 2, path.display());
        }
    }
    if dropped > 0 {
        warn!("Dropped {} rows from {}", dropped, path.display());
    }

    Ok(sanitize_bars(bars))
}
