//! Engine server: JSON boundary between the node editor and the native
//! engine. Loads per-symbol OHLCV parquet files and exposes backtest,
//! optimization and custom-indicator import endpoints.
//!
//! Run: PARQUET_DIR=./data cargo run --release --bin server

use axum::http::StatusCode;
use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use flowgraph_engine::custom;
use flowgraph_engine::engine::{
    self, maximize, run_optimization, BacktestResult, OptimizationConfig, OptimizationResult,
    PartialBacktestConfig, PerformanceMetrics,
};
use flowgraph_engine::market::Bar;
use flowgraph_engine::strategy::Strategy;

// ============================================================================
// State & Config
// ============================================================================

struct AppState {
    parquet_dir: PathBuf,
}

// ============================================================================
// Parquet Reading
// ============================================================================

fn read_parquet_bars(path: &PathBuf) -> Option<Vec<Bar>> {
    use arrow::array::{Array, Float64Array, StringArray, TimestampNanosecondArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::File;

    let file = File::open(path).ok()?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).ok()?;
    let reader = builder.build().ok()?;

    let mut bars = Vec::new();

    for batch in reader {
        let batch = batch.ok()?;

        // Date column: timestamp or YYYY-MM-DD strings
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

fn symbol_path(state: &AppState, symbol: &str) -> PathBuf {
    state.parquet_dir.join(format!("{}.parquet", symbol))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct TickerListResponse {
    tickers: Vec<String>,
    count: usize,
}

#[derive(Deserialize)]
struct CandlesQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct CandlesResponse {
    ticker: String,
    candles: Vec<Bar>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BacktestRequest {
    strategy: Strategy,
    symbol: String,
    #[serde(default)]
    config: Option<PartialBacktestConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeRequest {
    strategy: Strategy,
    symbol: String,
    #[serde(default)]
    config: Option<PartialBacktestConfig>,
    optimization: OptimizationConfig,
    /// Metric to maximize: profitFactor, sharpeRatio, totalProfit or winRate.
    #[serde(default)]
    metric: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRequest {
    source: String,
    file_name: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_tickers(State(state): State<Arc<AppState>>) -> Json<TickerListResponse> {
    let mut tickers: Vec<String> = std::fs::read_dir(&state.parquet_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let path = e.path();
                    if path.extension().is_some_and(|ext| ext == "parquet") {
                        path.file_stem()
                            .and_then(|s| s.to_str())
                            .map(|s| s.to_string())
                    } else {
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    tickers.sort();
    let count = tickers.len();
    Json(TickerListResponse { tickers, count })
}

async fn get_candles(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<CandlesQuery>,
) -> Json<CandlesResponse> {
    let candles = read_parquet_bars(&symbol_path(&state, &ticker))
        .map(|bars| {
            let limit = query.limit.unwrap_or(usize::MAX);
            let start = bars.len().saturating_sub(limit);
            bars[start..].to_vec()
        })
        .unwrap_or_default();

    Json(CandlesResponse { ticker, candles })
}

async fn run_backtest_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BacktestRequest>,
) -> Result<Json<BacktestResult>, (StatusCode, String)> {
    let start = Instant::now();

    let bars = read_parquet_bars(&symbol_path(&state, &req.symbol))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no data for {}", req.symbol)))?;

    match engine::run_backtest(&req.strategy, &req.symbol, &bars, req.config.as_ref()) {
        Ok(result) => {
            eprintln!(
                "[RUN] {} bars, {} trades in {:.2}ms",
                bars.len(),
                result.trades.len(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            Ok(Json(result))
        }
        Err(e) => {
            eprintln!("[RUN] error: {}", e);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

fn metric_extractor(name: &str) -> fn(&PerformanceMetrics) -> f64 {
    match name {
        "sharpeRatio" => |m: &PerformanceMetrics| m.sharpe_ratio,
        "totalProfit" => |m: &PerformanceMetrics| m.total_profit,
        "winRate" => |m: &PerformanceMetrics| m.win_rate,
        _ => |m: &PerformanceMetrics| m.profit_factor,
    }
}

async fn run_optimize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizationResult>, (StatusCode, String)> {
    let start = Instant::now();

    let bars = read_parquet_bars(&symbol_path(&state, &req.symbol))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no data for {}", req.symbol)))?;

    let extract = metric_extractor(req.metric.as_deref().unwrap_or("profitFactor"));

    let result = run_optimization(
        &req.strategy,
        &req.symbol,
        &bars,
        req.config.as_ref(),
        &req.optimization,
        |percent, iteration| eprintln!("[OPT] {:.1}% (iteration {})", percent, iteration),
        maximize(extract),
        None,
    )
    .map_err(|e| {
        eprintln!("[OPT] error: {}", e);
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;

    eprintln!(
        "[OPT] {} candidates in {:.2}ms",
        result.total_iterations,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(Json(result))
}

async fn import_indicator_handler(
    Json(req): Json<ImportRequest>,
) -> Result<Json<custom::IndicatorSchema>, (StatusCode, String)> {
    custom::parse_indicator_source(&req.source, &req.file_name)
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.reason))
}

#[tokio::main]
async fn main() {
    let parquet_dir = std::env::var("PARQUET_DIR").unwrap_or_else(|_| "./data".to_string());

    let state = Arc::new(AppState {
        parquet_dir: PathBuf::from(&parquet_dir),
    });

    eprintln!("Parquet dir: {}", parquet_dir);

    let app = Router::new()
        .route("/tickers", get(list_tickers))
        .route("/candles/{ticker}", get(get_candles))
        .route("/api/backtest", post(run_backtest_handler))
        .route("/api/optimize", post(run_optimize_handler))
        .route("/api/import-indicator", post(import_indicator_handler))
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB limit for large strategies
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3030));
    println!("Flowgraph engine server on http://{}", addr);
    println!("  GET  /tickers               - list symbols");
    println!("  GET  /candles/:ticker       - OHLCV data");
    println!("  POST /api/backtest          - run one strategy backtest");
    println!("  POST /api/optimize          - sweep a parameter grid");
    println!("  POST /api/import-indicator  - parse custom indicator source");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
