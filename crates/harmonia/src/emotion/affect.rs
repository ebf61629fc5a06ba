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

use super::{Emotion, EmotionScore};
use serde::{Deserialize, Serialize};

/// (valence, arousal) at full confidence.
fn coefficients(label: Emotion) -> (f64, f64) {
    match label {
        Emotion::Neutral => (0.0, 0.2),
        Emotion::Happy => (1.0, 0.8),
        Emotion::Sad => (-0.8, 0.3),
        Emotion::Angry => (-0.9, 0.9),
        Emotion::Fearful => (-0.7, 0.8),
        Emotion::Disgusted => (-0.6, 0.5),
        Emotion::Surprised => (0.3, 0.9),
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Pleasantness in [-1, 1].
pub fn valence(label: Emotion, confidence: f64) -> f64 {
    coefficients(label).0 * clamp_confidence(confidence)
}

/// Activation in [0, 1].
pub fn arousal(label: Emotion, confidence: f64) -> f64 {
    coefficients(label).1 * clamp_confidence(confidence)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectPoint {
    pub valence: f64,
    pub arousal: f64,
}

impl From<&EmotionScore> for AffectPoint {
    fn from(score: &EmotionScore) -> Self {
        Self {
            valence: valence(score.label, score.confidence),
            arousal: arousal(score.label, score.confidence),
        }
    }
}
