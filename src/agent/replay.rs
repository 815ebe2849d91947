//! Experience replay memory.
//!
//! Bounded FIFO ring of past transitions: insertion past capacity evicts
//! the oldest entry. Duplicates are permitted; this is a buffer, not a
//! set.

use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::TradeAction;

/// A single transition observed by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: Vec<f64>,
    pub action: TradeAction,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub terminal: bool,
}

impl Experience {
    pub fn new(
        state: Vec<f64>,
        action: TradeAction,
        reward: f64,
        next_state: Vec<f64>,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }
}

/// Bounded FIFO replay memory.
#[derive(Debug)]
pub struct ReplayMemory {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an experience, evicting the oldest once full.
    pub fn push(&mut self, experience: Experience) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Uniform random sample without replacement, clamped to the current
    /// size.
    pub fn sample(&self, batch_size: usize) -> Vec<&Experience> {
        let mut indices: Vec<usize> = (0..self.buffer.len()).collect();
        indices.shuffle(&mut thread_rng());
        indices
            .into_iter()
            .take(batch_size.min(self.buffer.len()))
            .map(|i| &self.buffer[i])
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.buffer.iter()
    }
}

impl Default for ReplayMemory {
    fn default() -> Self {
        Self::new(2000)
    }
}
