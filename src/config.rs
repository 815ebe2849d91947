//! Layered application configuration.
//!
//! Sources, later wins: `config/default.toml`, an optional explicit
//! file, then `QUANTBOT`-prefixed environment variables with `__` as
//! the section separator (e.g. `QUANTBOT__POLICY__RISK_PCT=2.5`).
//! The loaded config is validated once and then treated as immutable.

use std::path::Path;

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::agent::AgentConfig;
use crate::drift::DriftThreshold;
use crate::error::{QuantbotError, Result};
use crate::execution::{ExecutionPolicy, SymbolFilters};
use crate::gate::{GatePolicy, TradingHours};
use crate::risk::RiskLimits;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub policy: PolicyConfig,
    pub risk: RiskLimits,
    pub gate: GateConfig,
    pub execution: ExecutionConfig,
    pub drift: DriftThreshold,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            policy: PolicyConfig::default(),
            risk: RiskLimits {
                max_position_ratio: dec!(0.5),
                min_position_size: dec!(0.001),
            },
            gate: GateConfig::default(),
            execution: ExecutionConfig::default(),
            drift: DriftThreshold::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub symbols: Vec<String>,
    /// Decision cycle cadence.
    pub interval_seconds: u64,
    /// OHLCV rows fetched per cycle; must cover at least one window.
    pub history_len: usize,
    /// Seed balance for the virtual ledger.
    pub starting_balance: Decimal,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            interval_seconds: 60,
            history_len: 64,
            starting_balance: dec!(10000),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Window length fed to each sequence regressor.
    pub time_steps: usize,
    /// Strategy weight file (JSON model_id -> weight).
    pub weights_path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            time_steps: 10,
            weights_path: "data/strategy_weights.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum |aggregate - reference| before a directional action.
    pub min_confidence: f64,
    /// Percentage of balance risked per trade.
    pub risk_pct: Decimal,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            risk_pct: dec!(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub cooldown_seconds: u64,
    pub min_confidence: f64,
    /// 0 = unlimited.
    pub max_daily_trades: u32,
    pub trading_hours: TradingHours,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300,
            min_confidence: 0.0,
            max_daily_trades: 0,
            trading_hours: TradingHours::always(),
        }
    }
}

impl GateConfig {
    pub fn to_policy(&self) -> GatePolicy {
        GatePolicy {
            cooldown_seconds: self.cooldown_seconds,
            min_confidence: self.min_confidence,
            trading_hours: self.trading_hours.clone(),
            max_daily_trades: self.max_daily_trades,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub live: bool,
    pub policy: ExecutionPolicy,
    pub filters: SymbolFilters,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            live: false,
            policy: ExecutionPolicy::default(),
            filters: SymbolFilters {
                min_qty: dec!(0.00001),
                step_size: dec!(0.00001),
                tick_size: dec!(0.01),
                min_price: dec!(0.01),
                max_price: dec!(100000000),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing EnvFilter directive, e.g. "info" or "quantbot=debug".
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load and validate from the layered sources.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));
        if let Ok(env_name) = std::env::var("QUANTBOT_ENV") {
            builder = builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
        }
        if let Some(path) = explicit_path {
            builder = builder.add_source(File::from(path));
        }
        let raw = builder
            .add_source(Environment::with_prefix("QUANTBOT").separator("__"))
            .build()?;

        let cfg: AppConfig = raw.try_deserialize()?;
        cfg.validate().map_err(|issues| {
            QuantbotError::Internal(format!("invalid configuration: {}", issues.join("; ")))
        })?;
        Ok(cfg)
    }

    /// Cross-field sanity checks that serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.market.symbols.is_empty() {
            issues.push("market.symbols must not be empty".to_string());
        }
        if self.market.interval_seconds == 0 {
            issues.push("market.interval_seconds must be positive".to_string());
        }
        if self.model.time_steps == 0 {
            issues.push("model.time_steps must be positive".to_string());
        }
        if self.market.history_len < self.model.time_steps {
            issues.push(format!(
                "market.history_len ({}) must cover model.time_steps ({})",
                self.market.history_len, self.model.time_steps
            ));
        }
        if self.market.starting_balance <= Decimal::ZERO {
            issues.push("market.starting_balance must be positive".to_string());
        }
        if self.policy.risk_pct <= Decimal::ZERO || self.policy.risk_pct > dec!(100) {
            issues.push("policy.risk_pct must be in (0, 100]".to_string());
        }
        if self.policy.min_confidence < 0.0 {
            issues.push("policy.min_confidence must be non-negative".to_string());
        }
        if self.risk.max_position_ratio <= Decimal::ZERO || self.risk.max_position_ratio > Decimal::ONE
        {
            issues.push("risk.max_position_ratio must be in (0, 1]".to_string());
        }
        if self.risk.min_position_size <= Decimal::ZERO {
            issues.push("risk.min_position_size must be positive".to_string());
        }
        if self.agent.batch_size == 0 || self.agent.batch_size > self.agent.memory_capacity {
            issues.push("agent.batch_size must be in [1, memory_capacity]".to_string());
        }
        if !(0.0..=1.0).contains(&self.agent.epsilon)
            || !(0.0..=1.0).contains(&self.agent.epsilon_min)
            || self.agent.epsilon_min > self.agent.epsilon
        {
            issues.push("agent epsilon settings must satisfy 0 <= epsilon_min <= epsilon <= 1".to_string());
        }
        if self.agent.epsilon_decay <= 0.0 || self.agent.epsilon_decay > 1.0 {
            issues.push("agent.epsilon_decay must be in (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.agent.gamma) {
            issues.push("agent.gamma must be in [0, 1]".to_string());
        }
        if self.execution.policy.request_timeout_ms == 0 {
            issues.push("execution.policy.request_timeout_ms must be positive".to_string());
        }
        match self.drift {
            DriftThreshold::Absolute(v) if v <= 0.0 => {
                issues.push("drift absolute threshold must be positive".to_string())
            }
            DriftThreshold::Relative(v) if v <= 0.0 => {
                issues.push("drift relative threshold must be positive".to_string())
            }
            _ => {}
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
