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

use crate::emotion::Emotion;
use crate::music::MusicSelection;
use crate::policy::QTable;
use crate::safety::CrisisLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The result of one completed session, appended to the profile history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub pre_emotion: Emotion,
    pub post_emotion: Emotion,
    pub pre_valence: f64,
    pub post_valence: f64,
    pub improvement: f64,
    pub pre_panas: Option<f64>,
    pub post_panas: Option<f64>,
    pub reward: f64,
    pub state_key: String,
    pub action_key: String,
    pub selection: MusicSelection,
    pub crisis_override: bool,
    pub peak_crisis_level: CrisisLevel,
    pub observation_count: usize,
    pub segment_count: usize,
}

/// Everything learned about one user. Loaded and saved as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub q_table: QTable,
    pub exploration_rate: f64,
    pub total_updates: u64,
    pub history: Vec<SessionOutcome>,
    pub improvements: Vec<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, exploration_rate: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            q_table: QTable::new(),
            exploration_rate,
            total_updates: 0,
            history: Vec::new(),
            improvements: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_count(&self) -> usize {
        self.history.len()
    }

    pub fn last_outcome(&self) -> Option<&SessionOutcome> {
        self.history.last()
    }

    pub(crate) fn record_outcome(&mut self, outcome: SessionOutcome, exploration_rate: f64) {
        self.improvements.push(outcome.improvement);
        self.updated_at = outcome.ended_at;
        self.history.push(outcome);
        self.exploration_rate = exploration_rate;
        self.total_updates += 1;
    }
}
