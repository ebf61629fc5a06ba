// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use super::{EmotionState, MusicAction};
use crate::config::LearningConfig;
use crate::error::{EngineError, EngineResult};
use crate::logging::log_policy_update;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sparse state -> action -> value table. Unseen pairs read as 0 and the
/// table is never pruned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QTable {
    entries: HashMap<String, HashMap<String, f64>>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, state_key: &str, action_key: &str) -> f64 {
        self.entries
            .get(state_key)
            .and_then(|actions| actions.get(action_key))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set(&mut self, state_key: &str, action_key: &str, value: f64) {
        self.entries
            .entry(state_key.to_string())
            .or_default()
            .insert(action_key.to_string(), value);
    }

    pub fn contains(&self, state_key: &str, action_key: &str) -> bool {
        self.entries
            .get(state_key)
            .is_some_and(|actions| actions.contains_key(action_key))
    }

    /// `max_a Q(state, a)` over the given actions.
    pub fn max_value(&self, state_key: &str, actions: &[MusicAction]) -> f64 {
        actions
            .iter()
            .map(|action| self.get(state_key, &action.action_key()))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Number of stored (state, action) entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn states(&self) -> impl Iterator<Item = (&String, &HashMap<String, f64>)> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QUpdate {
    pub state_key: String,
    pub action_key: String,
    pub reward: f64,
    pub previous: f64,
    pub updated: f64,
    pub td_error: f64,
}

/// Reward from the valence delta; a valence range of [-1, 1] bounds it to
/// [-1, 1].
pub fn reward(pre_valence: f64, post_valence: f64) -> f64 {
    (post_valence - pre_valence) / 2.0
}

#[derive(Debug, Clone)]
pub struct QLearningPolicy {
    learning_rate: f64,
    discount_factor: f64,
    exploration_decay: f64,
    min_exploration_rate: f64,
}

impl Default for QLearningPolicy {
    fn default() -> Self {
        Self::new(&LearningConfig::default())
    }
}

impl QLearningPolicy {
    pub fn new(config: &LearningConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            discount_factor: config.discount_factor,
            exploration_decay: config.exploration_decay,
            min_exploration_rate: config.min_exploration_rate,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    /// Epsilon-greedy choice. With probability `exploration_rate` a uniform
    /// random action, otherwise the highest-valued one.
    pub fn select<R: Rng + ?Sized>(
        &self,
        state: &EmotionState,
        actions: &[MusicAction],
        table: &QTable,
        exploration_rate: f64,
        rng: &mut R,
    ) -> EngineResult<MusicAction> {
        if actions.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "No possible actions for state {}",
                state.state_key()
            )));
        }

        if rng.gen::<f64>() < exploration_rate {
            let index = rng.gen_range(0..actions.len());
            return Ok(actions[index].clone());
        }

        self.best_action(&state.state_key(), actions, table)
            .cloned()
            .ok_or_else(|| EngineError::InvalidInput("No possible actions".to_string()))
    }

    /// Argmax over `actions`; the first-listed action wins ties.
    pub fn best_action<'a>(
        &self,
        state_key: &str,
        actions: &'a [MusicAction],
        table: &QTable,
    ) -> Option<&'a MusicAction> {
        let mut best: Option<(&MusicAction, f64)> = None;
        for action in actions {
            let value = table.get(state_key, &action.action_key());
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((action, value)),
            }
        }
        best.map(|(action, _)| action)
    }

    /// One-step update:
    /// `Q(s,a) <- Q(s,a) + alpha * (r + gamma * max_a' Q(s',a') - Q(s,a))`.
    pub fn update(
        &self,
        table: &mut QTable,
        state_key: &str,
        action_key: &str,
        reward: f64,
        next_state_key: &str,
        next_actions: &[MusicAction],
    ) -> EngineResult<QUpdate> {
        if next_actions.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "No possible actions for next state {next_state_key}"
            )));
        }
        if !reward.is_finite() {
            return Err(EngineError::InvalidInput(format!(
                "Reward must be finite, got {reward}"
            )));
        }

        let previous = table.get(state_key, action_key);
        let next_max = table.max_value(next_state_key, next_actions);
        let td_error = reward + self.discount_factor * next_max - previous;
        let updated = previous + self.learning_rate * td_error;
        table.set(state_key, action_key, updated);

        log_policy_update(state_key, action_key, previous, updated);

        Ok(QUpdate {
            state_key: state_key.to_string(),
            action_key: action_key.to_string(),
            reward,
            previous,
            updated,
            td_error,
        })
    }

    pub fn decay(&self, exploration_rate: f64) -> f64 {
        (exploration_rate * self.exploration_decay).max(self.min_exploration_rate)
    }
}
