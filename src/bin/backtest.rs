//! Native backtest CLI
//!
//! Usage: backtest <strategy.json> <data.parquet> [symbol]
//!
//! Prints the full result as JSON on stdout; progress goes to stderr.

use arrow::array::{Array, Float64Array, StringArray, TimestampNanosecondArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use flowgraph_engine::engine::run_backtest;
use flowgraph_engine::market::Bar;
use flowgraph_engine::strategy::Strategy;

fn read_parquet_bars(path: &PathBuf) -> Option<Vec<Bar>> {
    let file = File::open(path).ok()?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).ok()?;
    let reader = builder.build().ok()?;

    let mut bars = Vec::new();
    for batch in reader {
        let batch = batch.ok()?;

        let mut times: Vec<i64> = Vec::with_capacity(batch.num_rows());
        if let Some(col) = batch.column_by_name("Date") {
            if let Some(arr) = col.as_any().downcast_ref::<TimestampNanosecondArray>() {
                for i in 0..arr.len() {
                    times.push(arr.value(i) / 1_000_000);
                }
            } else if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
                for i in 0..arr.len() {
                    let ms = chrono::NaiveDate::parse_from_str(arr.value(i), "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc().timestamp_millis())
                        .unwrap_or(0);
                    times.push(ms);
                }
            }
        }
        if times.len() != batch.num_rows() {
            return None;
        }

        let extract = |name: &str| -> Option<Vec<f64>> {
            let col = batch.column_by_name(name)?;
            let arr = col.as_any().downcast_ref::<Float64Array>()?;
            Some(
                (0..arr.len())
                    .map(|i| if arr.is_null(i) { f64::NAN } else { arr.value(i) })
                    .collect(),
            )
        };

        let opens = extract("Open")?;
        let highs = extract("High")?;
        let lows = extract("Low")?;
        let closes = extract("Close")?;
        let volumes = extract("Volume").unwrap_or_else(|| vec![0.0; batch.num_rows()]);

        for i in 0..batch.num_rows() {
            bars.push(Bar {
                time: times[i],
                open: opens[i],
                high: highs[i],
                low: lows[i],
                close: closes[i],
                volume: volumes[i],
            });
        }
    }

    Some(bars)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: backtest <strategy.json> <data.parquet> [symbol]");
        return ExitCode::FAILURE;
    }

    let strategy_text = match std::fs::read_to_string(&args[1]) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args[1], e);
            return ExitCode::FAILURE;
        }
    };
    let strategy: Strategy = match serde_json::from_str(&strategy_text) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to parse strategy: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let data_path = PathBuf::from(&args[2]);
    let Some(bars) = read_parquet_bars(&data_path) else {
        eprintln!("Failed to read bars from {}", data_path.display());
        return ExitCode::FAILURE;
    };

    let symbol = args
        .get(3)
        .cloned()
        .or_else(|| strategy.settings.pairs.first().cloned())
        .unwrap_or_else(|| "EURUSD".to_string());

    eprintln!(
        "[RUN] strategy '{}' over {} bars of {}",
        strategy.name,
        bars.len(),
        symbol
    );
    let start = Instant::now();

    match run_backtest(&strategy, &symbol, &bars, None) {
        Ok(result) => {
            eprintln!(
                "[RUN] {} trades, final balance {:.2} in {:.2}ms",
                result.trades.len(),
                result.final_balance,
                start.elapsed().as_secs_f64() * 1000.0
            );
            for warning in &result.warnings {
                eprintln!("[WARN] {}", warning.message);
            }
            match serde_json::to_string_pretty(&result) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to serialize result: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("Backtest refused: {}", e);
            ExitCode::FAILURE
        }
    }
}
