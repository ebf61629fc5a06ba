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

pub mod tracker;

pub use tracker::SessionTracker;

use crate::emotion::{EmotionScore, FusedEmotion, FusionWeights};
use crate::music::MusicSelection;
use crate::policy::{EmotionState, MusicAction};
use crate::safety::CrisisLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionObservation {
    pub timestamp: DateTime<Utc>,
    pub emotion: EmotionScore,
    pub valence: f64,
    pub arousal: f64,
    pub weights: FusionWeights,
}

impl EmotionObservation {
    pub fn from_fused(fused: &FusedEmotion, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            emotion: fused.score,
            valence: fused.valence,
            arousal: fused.arousal,
            weights: fused.weights,
        }
    }
}

/// Pre/post questionnaire totals (PANAS positive-affect scale, 10..=50).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectScores {
    pub pre_panas: f64,
    pub post_panas: f64,
}

impl AffectScores {
    pub const SCALE_SPAN: f64 = 40.0;

    pub fn new(pre_panas: f64, post_panas: f64) -> Self {
        Self {
            pre_panas,
            post_panas,
        }
    }

    /// Questionnaire delta scaled to [-1, 1].
    pub fn reward(&self) -> f64 {
        ((self.post_panas - self.pre_panas) / Self::SCALE_SPAN).clamp(-1.0, 1.0)
    }
}

/// Renderer acknowledgement that a piece of music was played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSegment {
    pub segment_id: String,
    pub selection: MusicSelection,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl MusicSegment {
    pub fn new(selection: MusicSelection, started_at: DateTime<Utc>, duration_secs: f64) -> Self {
        Self {
            segment_id: uuid::Uuid::new_v4().to_string(),
            selection,
            started_at,
            duration_secs,
        }
    }
}

/// In-memory state of the running session. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub pre_emotion: EmotionScore,
    pub pre_valence: f64,
    pub pre_arousal: f64,
    pub observations: Vec<EmotionObservation>,
    /// The (state, action) pair credited at end.
    pub state: EmotionState,
    pub action: MusicAction,
    /// What is playing now. Starts as the credited action unless overridden.
    pub selection: MusicSelection,
    pub segments: Vec<MusicSegment>,
    pub crisis_override: bool,
    pub peak_crisis_level: CrisisLevel,
}

impl ActiveSession {
    pub fn latest_observation(&self) -> Option<&EmotionObservation> {
        self.observations.last()
    }

    pub fn duration_minutes(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.started_at).num_milliseconds() as f64 / 60_000.0).max(0.0)
    }
}
