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

pub mod affect;
pub mod classifiers;
pub mod fusion;

pub use affect::{arousal, valence, AffectPoint};
pub use classifiers::{
    normalise_scores, ClassificationReport, ClassifierError, ClassifierSet, LexiconTextAnalyser,
    ModalityClassifier, ModalityPayload,
};
pub use fusion::{
    EmotionFusion, FusedEmotion, FusionWeights, HeartRateSignal, ModalityInputs, StressLevel,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The seven discrete emotion labels.
///
/// Declaration order is the canonical order: fusion and policy argmax
/// resolve ties in favour of the earlier label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Surprised,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "neutral" => Ok(Emotion::Neutral),
            "happy" | "joy" => Ok(Emotion::Happy),
            "sad" | "sadness" => Ok(Emotion::Sad),
            "angry" | "anger" => Ok(Emotion::Angry),
            "fearful" | "fear" => Ok(Emotion::Fearful),
            "disgusted" | "disgust" => Ok(Emotion::Disgusted),
            "surprised" | "surprise" => Ok(Emotion::Surprised),
            other => Err(format!("Unknown emotion label: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub label: Emotion,
    pub confidence: f64,
}

impl EmotionScore {
    pub fn new(label: Emotion, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { label, confidence }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Face,
    Voice,
    Text,
    HeartRate,
}

impl Modality {
    pub const ALL: [Modality; 4] = [
        Modality::Face,
        Modality::Voice,
        Modality::Text,
        Modality::HeartRate,
    ];
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modality::Face => "face",
            Modality::Voice => "voice",
            Modality::Text => "text",
            Modality::HeartRate => "heart_rate",
        };
        f.write_str(name)
    }
}
