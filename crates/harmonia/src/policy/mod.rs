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

pub mod q_learning;

pub use q_learning::{reward, QLearningPolicy, QTable, QUpdate};

use crate::emotion::{Emotion, FusedEmotion};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn now() -> Self {
        Self::from_hour(chrono::Local::now().hour())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionSpeed {
    Slow,
    Medium,
    Fast,
}

impl fmt::Display for TransitionSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionSpeed::Slow => "slow",
            TransitionSpeed::Medium => "medium",
            TransitionSpeed::Fast => "fast",
        };
        f.write_str(name)
    }
}

/// Halves round away from zero, so -0.25 lands in bucket -3.
fn bucket(value: f64) -> i64 {
    (value * 10.0).round() as i64
}

/// The RL state. Valence and arousal are rounded to one decimal on
/// construction; `session_duration_minutes` is carried but is not part of
/// the table key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionState {
    pub current_emotion: Emotion,
    pub valence: f64,
    pub arousal: f64,
    pub session_duration_minutes: f64,
    pub time_of_day: TimeOfDay,
}

impl EmotionState {
    pub fn new(
        current_emotion: Emotion,
        valence: f64,
        arousal: f64,
        session_duration_minutes: f64,
        time_of_day: TimeOfDay,
    ) -> Self {
        Self {
            current_emotion,
            valence: bucket(valence) as f64 / 10.0,
            arousal: bucket(arousal) as f64 / 10.0,
            session_duration_minutes,
            time_of_day,
        }
    }

    pub fn from_fused(
        fused: &FusedEmotion,
        session_duration_minutes: f64,
        time_of_day: TimeOfDay,
    ) -> Self {
        Self::new(
            fused.score.label,
            fused.valence,
            fused.arousal,
            session_duration_minutes,
            time_of_day,
        )
    }

    /// `emotion_valence*10_arousal*10_timeOfDay`, e.g. `sad_-5_2_evening`.
    pub fn state_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.current_emotion,
            bucket(self.valence),
            bucket(self.arousal),
            self.time_of_day
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicAction {
    pub tempo_bpm: u32,
    pub intensity: f64,
    pub emotional_target: Emotion,
    pub transition_speed: TransitionSpeed,
}

impl MusicAction {
    pub fn new(
        tempo_bpm: u32,
        intensity: f64,
        emotional_target: Emotion,
        transition_speed: TransitionSpeed,
    ) -> Self {
        Self {
            tempo_bpm,
            intensity: intensity.clamp(0.0, 1.0),
            emotional_target,
            transition_speed,
        }
    }

    /// `target_tempo/10_speed`, e.g. `neutral_7_slow`. Tempos within the same
    /// 10 BPM bucket share an entry.
    pub fn action_key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.emotional_target,
            (f64::from(self.tempo_bpm) / 10.0).round() as i64,
            self.transition_speed
        )
    }
}

/// The legal actions for a current emotion, in tie-break order.
pub fn possible_actions(emotion: Emotion) -> Vec<MusicAction> {
    use Emotion::{Happy, Neutral};
    use TransitionSpeed::{Fast, Medium, Slow};

    let templates: &[(u32, f64, Emotion, TransitionSpeed)] = match emotion {
        Emotion::Sad => &[(70, 0.3, Neutral, Slow), (90, 0.5, Happy, Medium)],
        Emotion::Angry => &[(60, 0.2, Neutral, Slow), (80, 0.4, Neutral, Medium)],
        Emotion::Fearful => &[(60, 0.2, Neutral, Slow), (70, 0.3, Happy, Slow)],
        Emotion::Happy => &[
            (120, 0.7, Happy, Medium),
            (100, 0.5, Happy, Slow),
            (130, 0.8, Happy, Fast),
        ],
        Emotion::Neutral => &[(90, 0.5, Happy, Medium), (70, 0.3, Neutral, Slow)],
        Emotion::Surprised => &[(80, 0.4, Neutral, Slow), (100, 0.5, Happy, Medium)],
        Emotion::Disgusted => &[(75, 0.3, Neutral, Slow), (95, 0.5, Happy, Medium)],
    };

    templates
        .iter()
        .map(|&(tempo, intensity, target, speed)| MusicAction::new(tempo, intensity, target, speed))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_of_day_boundaries() {
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
    }

    #[test]
    fn test_state_key_buckets_and_ignores_duration() {
        let a = EmotionState::new(Emotion::Sad, -0.52, 0.19, 3.0, TimeOfDay::Evening);
        let b = EmotionState::new(Emotion::Sad, -0.48, 0.21, 42.0, TimeOfDay::Evening);
        assert_eq!(a.state_key(), "sad_-5_2_evening");
        assert_eq!(a.state_key(), b.state_key());
        assert!((a.valence + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_half_buckets_round_away_from_zero() {
        let state = EmotionState::new(Emotion::Sad, -0.25, 0.25, 0.0, TimeOfDay::Night);
        assert_eq!(state.state_key(), "sad_-3_3_night");
        let action = MusicAction::new(65, 0.5, Emotion::Happy, TransitionSpeed::Medium);
        assert_eq!(action.action_key(), "happy_7_medium");
    }

    #[test]
    fn test_action_key_buckets_tempo() {
        let action = MusicAction::new(72, 0.3, Emotion::Neutral, TransitionSpeed::Slow);
        assert_eq!(action.action_key(), "neutral_7_slow");
        let close = MusicAction::new(68, 0.9, Emotion::Neutral, TransitionSpeed::Slow);
        assert_eq!(action.action_key(), close.action_key());
    }

    #[test]
    fn test_every_emotion_has_a_small_action_set() {
        for emotion in Emotion::ALL {
            let actions = possible_actions(emotion);
            assert!((1..=3).contains(&actions.len()), "{emotion}");
        }
        assert_eq!(possible_actions(Emotion::Sad)[0].tempo_bpm, 70);
        assert_eq!(possible_actions(Emotion::Happy).len(), 3);
    }
}
