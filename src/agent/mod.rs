//! Reinforcement-learning agent.
//!
//! Epsilon-greedy action selection over a bounded experience-replay
//! memory, with a small online-trained Q head approximating per-action
//! values.

pub mod replay;

mod q_agent;

pub use q_agent::{realized_return_reward, AgentConfig, ReinforcementAgent};
pub use replay::{Experience, ReplayMemory};
