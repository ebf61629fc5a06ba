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

//! Records handed to the downstream music renderer.

use crate::emotion::Emotion;
use crate::policy::{MusicAction, TransitionSpeed};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicConfig {
    pub tempo_bpm: u32,
    pub intensity: f64,
    pub instrumentation: Vec<String>,
    pub transition_speed: TransitionSpeed,
    pub emotional_target: Emotion,
}

impl MusicConfig {
    /// The fixed configuration played whenever a severe crisis overrides
    /// the learned policy.
    pub fn crisis_calming() -> Self {
        Self {
            tempo_bpm: 50,
            intensity: 0.1,
            instrumentation: vec![
                "soft piano".to_string(),
                "ambient pad".to_string(),
                "nature sounds".to_string(),
            ],
            transition_speed: TransitionSpeed::Slow,
            emotional_target: Emotion::Neutral,
        }
    }

    pub fn from_action(action: &MusicAction) -> Self {
        let instrumentation: &[&str] = match action.emotional_target {
            Emotion::Happy | Emotion::Surprised => &["acoustic guitar", "piano", "light percussion"],
            _ => &["piano", "strings", "ambient pad"],
        };
        Self {
            tempo_bpm: action.tempo_bpm,
            intensity: action.intensity,
            instrumentation: instrumentation.iter().map(|s| s.to_string()).collect(),
            transition_speed: action.transition_speed,
            emotional_target: action.emotional_target,
        }
    }
}

impl From<&MusicConfig> for MusicAction {
    fn from(config: &MusicConfig) -> Self {
        MusicAction::new(
            config.tempo_bpm,
            config.intensity,
            config.emotional_target,
            config.transition_speed,
        )
    }
}

/// What the engine decided to play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "music", rename_all = "snake_case")]
pub enum MusicSelection {
    Adaptive(MusicAction),
    CrisisOverride(MusicConfig),
}

impl MusicSelection {
    pub fn is_override(&self) -> bool {
        matches!(self, MusicSelection::CrisisOverride(_))
    }

    pub fn tempo_bpm(&self) -> u32 {
        match self {
            MusicSelection::Adaptive(action) => action.tempo_bpm,
            MusicSelection::CrisisOverride(config) => config.tempo_bpm,
        }
    }

    /// The full renderer record for either variant.
    pub fn to_config(&self) -> MusicConfig {
        match self {
            MusicSelection::Adaptive(action) => MusicConfig::from_action(action),
            MusicSelection::CrisisOverride(config) => config.clone(),
        }
    }

    /// The action credited in the Q-table for this selection.
    pub fn to_action(&self) -> MusicAction {
        match self {
            MusicSelection::Adaptive(action) => action.clone(),
            MusicSelection::CrisisOverride(config) => MusicAction::from(config),
        }
    }
}
