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

//! Outcome summaries and two-condition effect sizes. Descriptive only: no
//! p-values are computed.

use crate::emotion::Emotion;
use crate::error::{EngineError, EngineResult};
use crate::profile::UserProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestAction {
    pub state_key: String,
    pub action_key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: String,
    pub sessions: usize,
    pub mean_reward: f64,
    pub mean_improvement: f64,
    pub improved_fraction: f64,
    pub crisis_overrides: usize,
    pub exploration_rate: f64,
    pub q_table_entries: usize,
    pub best_actions: BTreeMap<Emotion, BestAction>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample variance (n - 1 denominator).
fn variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

impl ProfileSummary {
    pub fn from_profile(profile: &UserProfile) -> Self {
        let rewards: Vec<f64> = profile.history.iter().map(|o| o.reward).collect();
        let improved = profile.improvements.iter().filter(|d| **d > 0.0).count();
        let improved_fraction = if profile.improvements.is_empty() {
            0.0
        } else {
            improved as f64 / profile.improvements.len() as f64
        };

        let mut best_actions: BTreeMap<Emotion, BestAction> = BTreeMap::new();
        for (state_key, actions) in profile.q_table.states() {
            let Some(emotion) = state_key
                .split('_')
                .next()
                .and_then(|label| label.parse::<Emotion>().ok())
            else {
                continue;
            };
            for (action_key, value) in actions {
                let better = best_actions
                    .get(&emotion)
                    .map_or(true, |best| *value > best.value);
                if better {
                    best_actions.insert(
                        emotion,
                        BestAction {
                            state_key: state_key.clone(),
                            action_key: action_key.clone(),
                            value: *value,
                        },
                    );
                }
            }
        }

        Self {
            user_id: profile.user_id.clone(),
            sessions: profile.history.len(),
            mean_reward: mean(&rewards),
            mean_improvement: mean(&profile.improvements),
            improved_fraction,
            crisis_overrides: profile.history.iter().filter(|o| o.crisis_override).count(),
            exploration_rate: profile.exploration_rate,
            q_table_entries: profile.q_table.len(),
            best_actions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionComparison {
    pub n_a: usize,
    pub n_b: usize,
    pub mean_a: f64,
    pub mean_b: f64,
    pub difference: f64,
    pub cohens_d: f64,
    pub welch_t: f64,
}

/// Compares improvement samples of two conditions (e.g. adaptive against a
/// fixed playlist). `difference` is `mean_a - mean_b`.
pub fn compare_conditions(a: &[f64], b: &[f64]) -> EngineResult<ConditionComparison> {
    if a.len() < 2 || b.len() < 2 {
        return Err(EngineError::InvalidInput(format!(
            "Each condition needs at least two samples, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    if a.iter().chain(b).any(|v| !v.is_finite()) {
        return Err(EngineError::InvalidInput(
            "Samples must be finite numbers".to_string(),
        ));
    }

    let (n_a, n_b) = (a.len() as f64, b.len() as f64);
    let (mean_a, mean_b) = (mean(a), mean(b));
    let (var_a, var_b) = (variance(a, mean_a), variance(b, mean_b));
    let difference = mean_a - mean_b;

    let pooled_sd = (((n_a - 1.0) * var_a + (n_b - 1.0) * var_b) / (n_a + n_b - 2.0)).sqrt();
    let cohens_d = if pooled_sd > 0.0 {
        difference / pooled_sd
    } else {
        0.0
    };

    let standard_error = (var_a / n_a + var_b / n_b).sqrt();
    let welch_t = if standard_error > 0.0 {
        difference / standard_error
    } else {
        0.0
    };

    Ok(ConditionComparison {
        n_a: a.len(),
        n_b: b.len(),
        mean_a,
        mean_b,
        difference,
        cohens_d,
        welch_t,
    })
}
