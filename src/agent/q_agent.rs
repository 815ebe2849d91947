use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::debug;

use crate::domain::TradeAction;
use crate::error::Result;
use crate::ml::{Activation, DenseNetwork};

use super::replay::{Experience, ReplayMemory};

/// Agent hyperparameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Discount factor for one-step TD targets.
    pub gamma: f64,
    /// Initial exploration rate.
    pub epsilon: f64,
    /// Exploration floor.
    pub epsilon_min: f64,
    /// Multiplicative decay applied after each effective replay.
    pub epsilon_decay: f64,
    /// Minimum memory size before replay trains.
    pub batch_size: usize,
    /// Replay memory capacity (FIFO).
    pub memory_capacity: usize,
    /// SGD step size for Q updates.
    pub learning_rate: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.95,
            epsilon: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            batch_size: 32,
            memory_capacity: 2000,
            learning_rate: 1e-3,
        }
    }
}

/// Epsilon-greedy agent with an online-trained Q head.
///
/// The head maps a flattened state to one value per action; exploitation
/// picks the argmax, exploration a uniform random action.
pub struct ReinforcementAgent {
    config: AgentConfig,
    q: DenseNetwork,
    memory: ReplayMemory,
    epsilon: f64,
}

impl ReinforcementAgent {
    pub fn new(state_dim: usize, config: AgentConfig) -> Self {
        let q = DenseNetwork::random(
            &[state_dim, 64, 64, TradeAction::all().len()],
            Activation::Relu,
            Activation::Linear,
        );
        let memory = ReplayMemory::new(config.memory_capacity);
        let epsilon = config.epsilon;
        Self {
            config,
            q,
            memory,
            epsilon,
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Pick an action for `state`: random with probability epsilon,
    /// otherwise the argmax of the approximated action values.
    pub fn act(&self, state: &[f64]) -> TradeAction {
        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() < self.epsilon {
            return *TradeAction::all()
                .choose(&mut rng)
                .expect("action space is non-empty");
        }
        self.greedy_action(state)
    }

    /// Best-known action for `state`, ignoring exploration.
    pub fn greedy_action(&self, state: &[f64]) -> TradeAction {
        let values = self.q_values(state);
        let mut best = TradeAction::Hold;
        let mut best_value = f64::NEG_INFINITY;
        for action in TradeAction::all() {
            let v = values[action.to_index()];
            if v > best_value {
                best_value = v;
                best = *action;
            }
        }
        best
    }

    /// Append a transition to replay memory (FIFO eviction at capacity).
    pub fn remember(&mut self, experience: Experience) {
        self.memory.push(experience);
    }

    /// One replay pass: sample a minibatch, apply one-step TD updates,
    /// then decay epsilon. No-op while memory is below the batch size.
    pub fn replay(&mut self) -> Result<()> {
        if self.memory.len() < self.config.batch_size {
            return Ok(());
        }

        let updates: Vec<(Vec<f64>, usize, f64)> = self
            .memory
            .sample(self.config.batch_size)
            .into_iter()
            .map(|e| {
                let mut target = e.reward;
                if !e.terminal {
                    target += self.config.gamma * self.best_value(&e.next_state);
                }
                (e.state.clone(), e.action.to_index(), target)
            })
            .collect();

        for (state, action_index, target) in updates {
            self.q
                .train_step_masked(&state, action_index, target, self.config.learning_rate)?;
        }

        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        debug!(epsilon = self.epsilon, "replay pass complete");
        Ok(())
    }

    fn q_values(&self, state: &[f64]) -> Vec<f64> {
        // A state the head cannot read scores everything at zero; the
        // greedy pick then degenerates to the first action rather than
        // panicking mid-cycle.
        self.q
            .forward(state)
            .unwrap_or_else(|_| vec![0.0; TradeAction::all().len()])
    }

    fn best_value(&self, state: &[f64]) -> f64 {
        self.q_values(state)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Reward tied to the realized directional return of the chosen action.
///
/// Replaces the legacy fixed-reference-price comparison: the sign and
/// magnitude now come from what the market actually did between the
/// decision and the next observation.
pub fn realized_return_reward(action: TradeAction, entry_price: f64, realized_price: f64) -> f64 {
    if entry_price <= 0.0 || !entry_price.is_finite() || !realized_price.is_finite() {
        return 0.0;
    }
    let ret = (realized_price - entry_price) / entry_price;
    match action {
        TradeAction::Buy => ret,
        TradeAction::Sell => -ret,
        TradeAction::Hold => 0.0,
    }
}
