//! Decision engine.
//!
//! One decision cycle per symbol per tick: fetch history, build feature
//! windows, forecast, learn from the previous cycle's outcome, decide,
//! gate, size, and route. Per-symbol state lives behind a `Mutex` so a
//! slow cycle delays only its own symbol; an overlapping tick for the
//! same symbol is skipped, never queued.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::agent::{Experience, ReinforcementAgent, realized_return_reward};
use crate::config::AppConfig;
use crate::domain::{
    Decision, ExecutionMode, ModelPrediction, OrderReceipt, OrderRequest, OrderSide, TradeAction,
    OBSERVATION_FEATURES,
};
use crate::drift::{DriftMonitor, DriftReport};
use crate::ensemble::PredictorEnsemble;
use crate::error::{QuantbotError, Result};
use crate::exchange::{ExchangeExecutor, MarketDataSource};
use crate::execution::{OrderRouter, OrderValidator, VirtualLedger};
use crate::features::FeatureWindowBuilder;
use crate::gate::{GateState, TradeGate};
use crate::ml::ModelKind;
use crate::policy::DecisionPolicy;
use crate::risk::RiskManager;
use crate::weights::WeightStore;

/// What one decision cycle produced, for logging and tests.
#[derive(Debug)]
pub struct CycleOutcome {
    pub symbol: String,
    pub decision: Decision,
    pub receipt: Option<OrderReceipt>,
    pub drift: Option<DriftReport>,
}

impl CycleOutcome {
    fn hold(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            decision: Decision::hold(),
            receipt: None,
            drift: None,
        }
    }
}

/// Carry-over from the previous cycle, scored once the next close is known.
struct PreviousCycle {
    state: Vec<f64>,
    action: TradeAction,
    close: f64,
    predictions: Vec<ModelPrediction>,
}

/// Everything owned per symbol. Mutated only under the symbol's lock.
struct SymbolContext {
    symbol: String,
    builder: FeatureWindowBuilder,
    ensemble: PredictorEnsemble,
    agent: ReinforcementAgent,
    gate: TradeGate,
    router: OrderRouter,
    weights: WeightStore,
    previous: Option<PreviousCycle>,
}

/// Read-only collaborators shared by every symbol's cycle.
struct EngineShared {
    market: Arc<dyn MarketDataSource>,
    policy: DecisionPolicy,
    risk: RiskManager,
    drift: DriftMonitor,
    risk_pct: Decimal,
    history_len: usize,
    mode: ExecutionMode,
    min_qty: Decimal,
    step_size: Decimal,
}

/// Smoothing factor for drift-driven weight updates: one cycle moves a
/// model's weight a tenth of the way toward its latest accuracy score.
const WEIGHT_SMOOTHING: f64 = 0.1;

pub struct TradingEngine {
    shared: Arc<EngineShared>,
    contexts: HashMap<String, Arc<Mutex<SymbolContext>>>,
    interval_seconds: u64,
    shutdown: Arc<AtomicBool>,
}

impl TradingEngine {
    pub fn new(
        config: &AppConfig,
        market: Arc<dyn MarketDataSource>,
        executor: Arc<dyn ExchangeExecutor>,
    ) -> Self {
        let mode = if config.execution.live {
            ExecutionMode::Live
        } else {
            ExecutionMode::Virtual
        };
        let time_steps = config.model.time_steps;
        let state_dim = time_steps * OBSERVATION_FEATURES;

        let base_store = WeightStore::new(&config.model.weights_path);
        let model_ids: Vec<&str> = ModelKind::forecasters().iter().map(|k| k.id()).collect();

        let shared = Arc::new(EngineShared {
            market,
            policy: DecisionPolicy::new(config.policy.min_confidence),
            risk: RiskManager::new(config.risk),
            drift: DriftMonitor::new(config.drift),
            risk_pct: config.policy.risk_pct,
            history_len: config.market.history_len,
            mode,
            min_qty: config.execution.filters.min_qty,
            step_size: config.execution.filters.step_size,
        });

        let contexts = config
            .market
            .symbols
            .iter()
            .map(|symbol| {
                let weights = base_store.for_symbol(symbol);
                let mut ensemble = PredictorEnsemble::new(time_steps, OBSERVATION_FEATURES);
                ensemble.set_weights(weights.load(&model_ids));

                let router = OrderRouter::new(
                    OrderValidator::new(config.execution.filters),
                    config.execution.policy,
                    VirtualLedger::new(config.market.starting_balance),
                    executor.clone(),
                );

                let ctx = SymbolContext {
                    symbol: symbol.clone(),
                    builder: FeatureWindowBuilder::new(time_steps, OBSERVATION_FEATURES),
                    ensemble,
                    agent: ReinforcementAgent::new(state_dim, config.agent.clone()),
                    gate: TradeGate::new(config.gate.to_policy()),
                    router,
                    weights,
                    previous: None,
                };
                (symbol.clone(), Arc::new(Mutex::new(ctx)))
            })
            .collect();

        Self {
            shared,
            contexts,
            interval_seconds: config.market.interval_seconds,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.contexts.keys().map(String::as_str).collect()
    }

    /// Handle that stops the scheduler loop from another task.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run one full decision cycle for `symbol`, waiting for its lock.
    pub async fn execute_decision(&self, symbol: &str) -> Result<CycleOutcome> {
        let ctx = self
            .contexts
            .get(symbol)
            .ok_or_else(|| QuantbotError::Internal(format!("unknown symbol: {symbol}")))?;
        let mut guard = ctx.lock().await;
        run_cycle(&self.shared, &mut guard).await
    }

    /// Engage the emergency stop on every symbol's gate.
    pub async fn emergency_stop(&self) {
        for ctx in self.contexts.values() {
            ctx.lock().await.gate.emergency_stop();
        }
    }

    pub async fn resume(&self) {
        for ctx in self.contexts.values() {
            ctx.lock().await.gate.resume();
        }
    }

    /// Scheduler loop: one tick per interval, one concurrent cycle per
    /// symbol at most. A symbol still busy from the previous tick is
    /// skipped with a warning. Errors are logged and never stop the loop.
    pub async fn run(&self) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            symbols = ?self.symbols(),
            interval_seconds = self.interval_seconds,
            mode = %self.shared.mode,
            "engine started"
        );

        loop {
            interval.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, engine stopping");
                return Ok(());
            }

            for (symbol, ctx) in &self.contexts {
                match ctx.clone().try_lock_owned() {
                    Ok(mut guard) => {
                        let shared = self.shared.clone();
                        let symbol = symbol.clone();
                        tokio::spawn(async move {
                            match run_cycle(&shared, &mut guard).await {
                                Ok(outcome) => {
                                    debug!(
                                        symbol = %outcome.symbol,
                                        action = %outcome.decision.action,
                                        traded = outcome.receipt.is_some(),
                                        "cycle complete"
                                    );
                                }
                                Err(err) => {
                                    error!(symbol = %symbol, error = %err, "decision cycle failed");
                                }
                            }
                        });
                    }
                    Err(_) => {
                        warn!(symbol = %symbol, "previous cycle still running, skipping tick");
                    }
                }
            }
        }
    }
}

async fn run_cycle(shared: &EngineShared, ctx: &mut SymbolContext) -> Result<CycleOutcome> {
    if ctx.gate.state() == GateState::EmergencyStopped {
        debug!(symbol = %ctx.symbol, "emergency stop active, skipping cycle");
        return Ok(CycleOutcome::hold(&ctx.symbol));
    }

    let rows = shared
        .market
        .fetch_window(&ctx.symbol, shared.history_len)
        .await?;

    let features = match ctx.builder.build(&rows) {
        Ok(features) => features,
        Err(err) => {
            // Not enough history yet: observe-only, no trade.
            warn!(symbol = %ctx.symbol, error = %err, "cannot build features, holding");
            return Ok(CycleOutcome::hold(&ctx.symbol));
        }
    };
    let close = rows
        .last()
        .map(|r| r.close)
        .ok_or_else(|| QuantbotError::Internal("empty history after window build".to_string()))?;

    let signal = match ctx.ensemble.predict(&features) {
        Ok(signal) => signal,
        Err(err) => {
            warn!(symbol = %ctx.symbol, error = %err, "ensemble failed, holding");
            return Ok(CycleOutcome::hold(&ctx.symbol));
        }
    };

    let state: Vec<f64> = features.latest().to_vec();

    // Score the previous cycle now that its outcome price is known.
    let drift = match ctx.previous.take() {
        Some(prev) => {
            let reward = realized_return_reward(prev.action, prev.close, close);
            ctx.agent.remember(Experience::new(
                prev.state,
                prev.action,
                reward,
                state.clone(),
                false,
            ));
            ctx.agent.replay()?;
            let report = shared.drift.check(&prev.predictions, close);
            reweigh_models(ctx, &report);
            Some(report)
        }
        None => None,
    };

    // Advisory only while the agent warms up: logged, not acted on.
    let advisory = ctx.agent.act(&state);
    debug!(
        symbol = %ctx.symbol,
        advisory = %advisory,
        epsilon = ctx.agent.epsilon(),
        "agent advisory action"
    );

    let decision = shared.policy.decide(&signal, close);
    info!(
        symbol = %ctx.symbol,
        action = %decision.action,
        confidence = decision.confidence,
        aggregate = signal.aggregate,
        close,
        "decision"
    );

    ctx.previous = Some(PreviousCycle {
        state,
        action: decision.action,
        close,
        predictions: signal.predictions.clone(),
    });

    let receipt = match OrderSide::from_action(decision.action) {
        Some(side) => execute_trade(shared, ctx, side, decision.confidence, close).await?,
        None => None,
    };

    Ok(CycleOutcome {
        symbol: ctx.symbol.clone(),
        decision,
        receipt,
        drift,
    })
}

/// Nudge each model's ensemble weight toward its latest accuracy score
/// and persist it to the symbol's own weight file. Advisory data only; a
/// save failure is logged and the cycle carries on.
fn reweigh_models(ctx: &mut SymbolContext, report: &DriftReport) {
    if report.models.is_empty() {
        return;
    }
    let current = ctx.ensemble.weights().cloned();
    let equal = 1.0 / report.models.len() as f64;

    let mut updated = BTreeMap::new();
    for m in &report.models {
        let score = 1.0 / (1.0 + m.squared_error);
        let old = current
            .as_ref()
            .and_then(|w| w.get(&m.model_id).copied())
            .unwrap_or(equal);
        updated.insert(
            m.model_id.clone(),
            (1.0 - WEIGHT_SMOOTHING) * old + WEIGHT_SMOOTHING * score,
        );
    }
    ctx.ensemble.set_weights(updated.clone());
    if let Err(err) = ctx.weights.save(&updated) {
        warn!(symbol = %ctx.symbol, error = %err, "failed to persist strategy weights");
    }
}

async fn execute_trade(
    shared: &EngineShared,
    ctx: &mut SymbolContext,
    side: OrderSide,
    confidence: f64,
    close: f64,
) -> Result<Option<OrderReceipt>> {
    let now = Utc::now();
    if !ctx.gate.can_trade(confidence, now) {
        debug!(symbol = %ctx.symbol, state = %ctx.gate.state(), "gate blocked trade");
        return Ok(None);
    }

    let balance = match shared.mode {
        ExecutionMode::Virtual => ctx.router.virtual_balance(),
        ExecutionMode::Live => shared.market.fetch_balance().await?,
    };
    let sizing = shared.risk.size(balance, shared.risk_pct)?;

    let price = Decimal::from_f64(close)
        .ok_or_else(|| QuantbotError::Internal(format!("non-finite close price {close}")))?;
    if price <= Decimal::ZERO {
        return Err(QuantbotError::Internal(format!(
            "non-positive close price {close}"
        )));
    }

    // Notional -> base quantity, snapped down to the step grid.
    let mut quantity = sizing.size / price;
    if shared.step_size > Decimal::ZERO {
        quantity = (quantity / shared.step_size).floor() * shared.step_size;
    }
    if quantity < shared.min_qty {
        debug!(symbol = %ctx.symbol, %quantity, "sized quantity below exchange minimum, skipping");
        return Ok(None);
    }

    let request = OrderRequest::market(ctx.symbol.clone(), side, quantity, shared.mode);
    match ctx.router.submit(&request, price).await {
        Ok(receipt) => {
            info!(
                symbol = %ctx.symbol,
                side = %side,
                %quantity,
                price = %receipt.price,
                order_id = %receipt.order_id,
                "trade executed"
            );
            ctx.gate.record_trade(now);
            Ok(Some(receipt))
        }
        Err(err) => {
            // A failed order leaves the gate untouched.
            warn!(symbol = %ctx.symbol, error = %err, "order rejected");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketObservation;
    use crate::exchange::{MockExchangeExecutor, MockMarketDataSource};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn history(n: usize, base: f64) -> Vec<MarketObservation> {
        (0..n)
            .map(|i| MarketObservation {
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap(),
                open: base + i as f64,
                high: base + i as f64 + 1.0,
                low: base + i as f64 - 1.0,
                close: base + i as f64 + 0.5,
                volume: 1000.0 + i as f64,
            })
            .collect()
    }

    fn test_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.market.symbols = vec!["BTCUSDT".to_string()];
        cfg.market.history_len = 16;
        cfg.model.time_steps = 5;
        cfg.model.weights_path = std::env::temp_dir()
            .join(format!("quantbot-test-weights-{}.json", uuid::Uuid::new_v4()))
            .display()
            .to_string();
        cfg.policy.min_confidence = 0.0;
        cfg.gate.cooldown_seconds = 300;
        cfg.execution.filters.min_qty = dec!(0.00001);
        cfg.execution.filters.step_size = dec!(0.00001);
        cfg
    }

    fn engine_with_market(cfg: &AppConfig, market: MockMarketDataSource) -> TradingEngine {
        let mut executor = MockExchangeExecutor::new();
        executor.expect_place_order().times(0);
        TradingEngine::new(cfg, Arc::new(market), Arc::new(executor))
    }

    #[tokio::test]
    async fn short_history_degrades_to_hold() {
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .returning(|_, _| Ok(history(3, 100.0)));

        let engine = engine_with_market(&cfg, market);
        let outcome = engine.execute_decision("BTCUSDT").await.unwrap();
        assert_eq!(outcome.decision.action, TradeAction::Hold);
        assert!(outcome.receipt.is_none());
        assert!(outcome.drift.is_none());
    }

    #[tokio::test]
    async fn directional_decision_places_virtual_order() {
        // Untrained heads forecast near zero after standardization, so
        // against a ~100 close the delta is large and directional.
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .returning(|_, _| Ok(history(16, 100.0)));

        let engine = engine_with_market(&cfg, market);
        let outcome = engine.execute_decision("BTCUSDT").await.unwrap();
        assert_ne!(outcome.decision.action, TradeAction::Hold);
        assert!(outcome.receipt.is_some(), "virtual trade should fill");
        let receipt = outcome.receipt.unwrap();
        assert_eq!(receipt.mode, ExecutionMode::Virtual);
    }

    #[tokio::test]
    async fn cooldown_blocks_the_next_cycle() {
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .returning(|_, _| Ok(history(16, 100.0)));

        let engine = engine_with_market(&cfg, market);
        let first = engine.execute_decision("BTCUSDT").await.unwrap();
        assert!(first.receipt.is_some());

        let second = engine.execute_decision("BTCUSDT").await.unwrap();
        assert!(second.receipt.is_none(), "gate cooldown holds the line");
    }

    #[tokio::test]
    async fn second_cycle_reports_drift_for_the_first() {
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .returning(|_, _| Ok(history(16, 100.0)));

        let engine = engine_with_market(&cfg, market);
        let first = engine.execute_decision("BTCUSDT").await.unwrap();
        assert!(first.drift.is_none());

        let second = engine.execute_decision("BTCUSDT").await.unwrap();
        let report = second.drift.expect("previous predictions scored");
        assert_eq!(report.models.len(), 3);
    }

    #[tokio::test]
    async fn drift_scores_reweigh_and_persist_strategy_weights() {
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .returning(|_, _| Ok(history(16, 100.0)));

        let engine = engine_with_market(&cfg, market);
        engine.execute_decision("BTCUSDT").await.unwrap();
        engine.execute_decision("BTCUSDT").await.unwrap();

        let store = WeightStore::new(&cfg.model.weights_path).for_symbol("BTCUSDT");
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let stored: std::collections::BTreeMap<String, f64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 3);
        let sum: f64 = stored.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);

        std::fs::remove_file(store.path()).ok();
    }

    #[tokio::test]
    async fn symbols_persist_weights_to_their_own_files() {
        let mut cfg = test_config();
        cfg.market.symbols = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let mut market = MockMarketDataSource::new();
        market.expect_fetch_window().returning(|symbol, _| {
            let base = if symbol == "BTCUSDT" { 100.0 } else { 2000.0 };
            Ok(history(16, base))
        });

        let engine = engine_with_market(&cfg, market);
        for _ in 0..2 {
            engine.execute_decision("BTCUSDT").await.unwrap();
            engine.execute_decision("ETHUSDT").await.unwrap();
        }

        let base = WeightStore::new(&cfg.model.weights_path);
        let btc = base.for_symbol("BTCUSDT");
        let eth = base.for_symbol("ETHUSDT");
        assert_ne!(btc.path(), eth.path());
        assert!(btc.path().exists(), "BTC weights written");
        assert!(eth.path().exists(), "ETH weights survive BTC's save");

        std::fs::remove_file(btc.path()).ok();
        std::fs::remove_file(eth.path()).ok();
    }

    #[tokio::test]
    async fn emergency_stop_blocks_all_trading() {
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market
            .expect_fetch_window()
            .returning(|_, _| Ok(history(16, 100.0)));

        let engine = engine_with_market(&cfg, market);
        engine.emergency_stop().await;
        let outcome = engine.execute_decision("BTCUSDT").await.unwrap();
        assert!(outcome.receipt.is_none());

        engine.resume().await;
        let outcome = engine.execute_decision("BTCUSDT").await.unwrap();
        assert!(outcome.receipt.is_some());
    }

    #[tokio::test]
    async fn market_errors_propagate() {
        let cfg = test_config();
        let mut market = MockMarketDataSource::new();
        market.expect_fetch_window().returning(|_, _| {
            Err(crate::error::ExchangeError::transient("rate_limit", "busy").into())
        });

        let engine = engine_with_market(&cfg, market);
        assert!(engine.execute_decision("BTCUSDT").await.is_err());
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let cfg = test_config();
        let market = MockMarketDataSource::new();
        let engine = engine_with_market(&cfg, market);
        assert!(engine.execute_decision("ETHUSDT").await.is_err());
    }
}
