use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quantbot::domain::{MarketObservation, OrderReceipt, OrderRequest};
use quantbot::error::ExchangeError;
use quantbot::exchange::{ExchangeExecutor, MarketDataSource};
use quantbot::{AppConfig, Result, TradingEngine};

#[derive(Parser)]
#[command(name = "quantbot", version, about = "AI-assisted trading decision engine")]
struct Cli {
    /// Extra config file layered over config/default.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run one decision cycle per symbol and exit.
    #[arg(long)]
    once: bool,
}

/// Random-walk OHLCV feed for paper trading without an exchange link.
struct SimulatedMarket {
    state: Mutex<rand::rngs::StdRng>,
    last_close: Mutex<f64>,
}

impl SimulatedMarket {
    fn new(start_price: f64) -> Self {
        use rand::SeedableRng;
        Self {
            state: Mutex::new(rand::rngs::StdRng::from_entropy()),
            last_close: Mutex::new(start_price),
        }
    }
}

#[async_trait]
impl MarketDataSource for SimulatedMarket {
    async fn fetch_window(&self, _symbol: &str, len: usize) -> Result<Vec<MarketObservation>> {
        let mut rng = self.state.lock().await;
        let mut close = *self.last_close.lock().await;
        let now = Utc::now();

        let mut rows = Vec::with_capacity(len);
        for i in 0..len {
            let drift: f64 = rng.gen_range(-0.005..0.005);
            let open = close;
            close = (close * (1.0 + drift)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.002));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.002));
            rows.push(MarketObservation {
                timestamp: now - ChronoDuration::seconds(((len - i) as i64) * 60),
                open,
                high,
                low,
                close,
                volume: rng.gen_range(500.0..2000.0),
            });
        }
        *self.last_close.lock().await = close;
        Ok(rows)
    }

    async fn fetch_balance(&self) -> Result<Decimal> {
        Ok(dec!(10000))
    }
}

/// Placeholder live executor: rejects every order until a real exchange
/// client is wired in. Virtual-mode orders never reach it.
struct UnconfiguredExchange;

#[async_trait]
impl ExchangeExecutor for UnconfiguredExchange {
    async fn place_order(
        &self,
        _request: &OrderRequest,
    ) -> std::result::Result<OrderReceipt, ExchangeError> {
        Err(ExchangeError::permanent(
            "no_exchange",
            "live execution is not configured",
        ))
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config);
    info!(symbols = ?config.market.symbols, live = config.execution.live, "starting");

    let market = Arc::new(SimulatedMarket::new(30_000.0));
    let executor = Arc::new(UnconfiguredExchange);
    let engine = TradingEngine::new(&config, market, executor);

    if cli.once {
        for symbol in config.market.symbols.clone() {
            match engine.execute_decision(&symbol).await {
                Ok(outcome) => info!(
                    symbol = %outcome.symbol,
                    action = %outcome.decision.action,
                    traded = outcome.receipt.is_some(),
                    "cycle complete"
                ),
                Err(err) => error!(symbol = %symbol, error = %err, "cycle failed"),
            }
        }
        return Ok(());
    }

    let shutdown = engine.shutdown_handle();
    tokio::select! {
        result = engine.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping");
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
            engine.emergency_stop().await;
        }
    }

    Ok(())
}
