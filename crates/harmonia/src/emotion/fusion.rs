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

//! Confidence-weighted fusion of per-modality emotion estimates.
//!
//! Each present modality is weighted by its top confidence times a fixed
//! reliability coefficient; the weights are normalised to sum to one and the
//! per-label evidence is accumulated, renormalised and reduced to an argmax.

use super::affect::{arousal, valence};
use super::{Emotion, EmotionScore, Modality};
use crate::config::FusionConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StressLevel {
    Low,
    Medium,
    High,
}

impl StressLevel {
    /// Fractional evidence a unit of heart-rate weight adds to each label.
    pub fn emotion_mass(self) -> &'static [(Emotion, f64)] {
        match self {
            StressLevel::High => &[(Emotion::Fearful, 0.6), (Emotion::Angry, 0.4)],
            StressLevel::Medium => &[(Emotion::Neutral, 1.0)],
            StressLevel::Low => &[(Emotion::Happy, 0.4), (Emotion::Neutral, 0.6)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSignal {
    pub bpm: Option<f64>,
    pub stress: StressLevel,
    pub confidence: f64,
}

impl HeartRateSignal {
    pub fn new(stress: StressLevel, confidence: f64) -> Self {
        Self {
            bpm: None,
            stress,
            confidence,
        }
    }

    /// Elevation over the resting rate: above 1.3x is high stress, above
    /// 1.1x medium.
    pub fn from_bpm(bpm: f64, resting_bpm: f64, confidence: f64) -> Self {
        let ratio = if resting_bpm > 0.0 {
            bpm / resting_bpm
        } else {
            1.0
        };
        let stress = if ratio > 1.3 {
            StressLevel::High
        } else if ratio > 1.1 {
            StressLevel::Medium
        } else {
            StressLevel::Low
        };
        Self {
            bpm: Some(bpm),
            stress,
            confidence,
        }
    }
}

/// Everything the classifiers produced for one decision point. `None` means
/// the modality did not run or failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityInputs {
    pub face: Option<Vec<EmotionScore>>,
    pub voice: Option<Vec<EmotionScore>>,
    pub text: Option<Vec<EmotionScore>>,
    pub heart_rate: Option<HeartRateSignal>,
}

impl ModalityInputs {
    pub fn scores(&self, modality: Modality) -> Option<&[EmotionScore]> {
        match modality {
            Modality::Face => self.face.as_deref(),
            Modality::Voice => self.voice.as_deref(),
            Modality::Text => self.text.as_deref(),
            Modality::HeartRate => None,
        }
    }

    pub fn set_scores(&mut self, modality: Modality, scores: Vec<EmotionScore>) {
        match modality {
            Modality::Face => self.face = Some(scores),
            Modality::Voice => self.voice = Some(scores),
            Modality::Text => self.text = Some(scores),
            Modality::HeartRate => {}
        }
    }

    pub fn top_confidence(&self, modality: Modality) -> f64 {
        match modality {
            Modality::HeartRate => self
                .heart_rate
                .map_or(0.0, |signal| unit(signal.confidence)),
            _ => self
                .scores(modality)
                .map_or(0.0, |scores| {
                    scores
                        .iter()
                        .map(|score| unit(score.confidence))
                        .fold(0.0, f64::max)
                }),
        }
    }

    pub fn has_evidence(&self) -> bool {
        Modality::ALL
            .iter()
            .any(|modality| self.top_confidence(*modality) > 0.0)
    }

    pub fn present_modalities(&self) -> Vec<Modality> {
        Modality::ALL
            .into_iter()
            .filter(|modality| match modality {
                Modality::HeartRate => self.heart_rate.is_some(),
                other => self.scores(*other).is_some(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FusionWeights {
    pub face: f64,
    pub voice: f64,
    pub text: f64,
    pub heart_rate: f64,
}

impl FusionWeights {
    pub fn get(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Face => self.face,
            Modality::Voice => self.voice,
            Modality::Text => self.text,
            Modality::HeartRate => self.heart_rate,
        }
    }

    pub fn sum(&self) -> f64 {
        self.face + self.voice + self.text + self.heart_rate
    }

    pub fn normalised(&self) -> Self {
        let total = self.sum();
        if total <= 0.0 {
            return *self;
        }
        Self {
            face: self.face / total,
            voice: self.voice / total,
            text: self.text / total,
            heart_rate: self.heart_rate / total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEmotion {
    pub score: EmotionScore,
    pub weights: FusionWeights,
    pub valence: f64,
    pub arousal: f64,
}

#[derive(Debug, Clone, Default)]
pub struct EmotionFusion {
    config: FusionConfig,
}

impl EmotionFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn compute_weights(&self, inputs: &ModalityInputs) -> FusionWeights {
        let reliability = &self.config.reliability;
        let raw = FusionWeights {
            face: inputs.top_confidence(Modality::Face) * reliability.face,
            voice: inputs.top_confidence(Modality::Voice) * reliability.voice,
            text: inputs.top_confidence(Modality::Text) * reliability.text,
            heart_rate: inputs.top_confidence(Modality::HeartRate) * reliability.heart_rate,
        };
        if raw.sum() > 0.0 {
            return raw.normalised();
        }

        let present = inputs.present_modalities();
        if present.is_empty() {
            return self.config.fallback_weights.normalised();
        }
        // Present but zero-confidence: absent modalities still get nothing.
        let fallback = &self.config.fallback_weights;
        let share = |modality: Modality| {
            if !present.contains(&modality) {
                0.0
            } else if present.iter().any(|m| fallback.get(*m) > 0.0) {
                fallback.get(modality)
            } else {
                1.0
            }
        };
        FusionWeights {
            face: share(Modality::Face),
            voice: share(Modality::Voice),
            text: share(Modality::Text),
            heart_rate: share(Modality::HeartRate),
        }
        .normalised()
    }

    pub fn fuse(&self, inputs: &ModalityInputs, weights: &FusionWeights) -> EmotionScore {
        let mut accumulators = [0.0_f64; Emotion::ALL.len()];
        let mut contributing_weight = 0.0;

        for modality in [Modality::Face, Modality::Voice, Modality::Text] {
            let Some(scores) = inputs.scores(modality) else {
                continue;
            };
            let weight = weights.get(modality);
            if weight <= 0.0 {
                continue;
            }
            contributing_weight += weight;
            for score in scores {
                accumulators[score.label.index()] += unit(score.confidence) * weight;
            }
        }

        if let Some(signal) = &inputs.heart_rate {
            let weight = weights.heart_rate;
            if weight > 0.0 {
                contributing_weight += weight;
                for (label, fraction) in signal.stress.emotion_mass() {
                    accumulators[label.index()] += fraction * weight;
                }
            }
        }

        if contributing_weight <= 0.0 {
            return EmotionScore::new(Emotion::Neutral, 0.0);
        }

        let mut best = EmotionScore {
            label: Emotion::Neutral,
            confidence: f64::NEG_INFINITY,
        };
        for label in Emotion::ALL {
            let value = accumulators[label.index()] / contributing_weight;
            // strict comparison keeps the earliest label on ties
            if value > best.confidence {
                best = EmotionScore { label, confidence: value };
            }
        }
        EmotionScore::new(best.label, best.confidence)
    }

    pub fn fuse_inputs(&self, inputs: &ModalityInputs) -> FusedEmotion {
        let weights = self.compute_weights(inputs);
        let score = self.fuse(inputs, &weights);
        FusedEmotion {
            valence: valence(score.label, score.confidence),
            arousal: arousal(score.label, score.confidence),
            score,
            weights,
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scores(entries: &[(Emotion, f64)]) -> Vec<EmotionScore> {
        entries
            .iter()
            .map(|(label, confidence)| EmotionScore::new(*label, *confidence))
            .collect()
    }

    #[test]
    fn test_face_only_gets_full_weight() {
        let fusion = EmotionFusion::default();
        let inputs = ModalityInputs {
            face: Some(scores(&[(Emotion::Happy, 0.9), (Emotion::Neutral, 0.1)])),
            ..Default::default()
        };
        let weights = fusion.compute_weights(&inputs);
        assert!((weights.face - 1.0).abs() < 1e-12);
        assert_eq!(weights.voice, 0.0);
        assert_eq!(weights.text, 0.0);
        assert_eq!(weights.heart_rate, 0.0);

        let fused = fusion.fuse(&inputs, &weights);
        assert_eq!(fused.label, Emotion::Happy);
        assert!((fused.confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_all_absent_uses_fallback_weights() {
        let fusion = EmotionFusion::default();
        let weights = fusion.compute_weights(&ModalityInputs::default());
        assert_eq!(weights.face, 0.35);
        assert_eq!(weights.voice, 0.30);
        assert_eq!(weights.text, 0.20);
        assert_eq!(weights.heart_rate, 0.15);

        let fused = fusion.fuse(&ModalityInputs::default(), &weights);
        assert_eq!(fused, EmotionScore::new(Emotion::Neutral, 0.0));
    }

    #[test]
    fn test_zero_confidence_modality_keeps_absent_ones_at_zero() {
        let fusion = EmotionFusion::default();
        let inputs = ModalityInputs {
            face: Some(scores(&[(Emotion::Happy, 0.0)])),
            ..Default::default()
        };
        let weights = fusion.compute_weights(&inputs);
        assert!((weights.face - 1.0).abs() < 1e-12);
        assert_eq!(weights.voice, 0.0);
        assert_eq!(weights.text, 0.0);
        assert_eq!(weights.heart_rate, 0.0);

        let inputs = ModalityInputs {
            face: Some(scores(&[(Emotion::Happy, 0.0)])),
            heart_rate: Some(HeartRateSignal::new(StressLevel::Low, 0.0)),
            ..Default::default()
        };
        let weights = fusion.compute_weights(&inputs);
        // fallback shares 0.35 and 0.15, renormalised over the two present
        assert!((weights.face - 0.7).abs() < 1e-12);
        assert!((weights.heart_rate - 0.3).abs() < 1e-12);
        assert_eq!(weights.voice, 0.0);
        assert_eq!(weights.text, 0.0);
    }

    #[test]
    fn test_reliability_scales_weights() {
        let fusion = EmotionFusion::default();
        let inputs = ModalityInputs {
            face: Some(scores(&[(Emotion::Sad, 0.5)])),
            text: Some(scores(&[(Emotion::Sad, 0.5)])),
            ..Default::default()
        };
        let weights = fusion.compute_weights(&inputs);
        // 0.6 vs 0.4 after normalising 1.2 * 0.5 and 0.8 * 0.5
        assert!((weights.face - 0.6).abs() < 1e-12);
        assert!((weights.text - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_ties_resolve_to_canonical_order() {
        let fusion = EmotionFusion::default();
        let inputs = ModalityInputs {
            voice: Some(scores(&[(Emotion::Surprised, 0.5), (Emotion::Happy, 0.5)])),
            ..Default::default()
        };
        let fused = fusion.fuse_inputs(&inputs);
        assert_eq!(fused.score.label, Emotion::Happy);
    }

    #[test]
    fn test_high_stress_heart_rate_pushes_towards_fear() {
        let fusion = EmotionFusion::default();
        let inputs = ModalityInputs {
            text: Some(scores(&[(Emotion::Neutral, 0.3)])),
            heart_rate: Some(HeartRateSignal::new(StressLevel::High, 0.9)),
            ..Default::default()
        };
        let fused = fusion.fuse_inputs(&inputs);
        assert_eq!(fused.score.label, Emotion::Fearful);
        assert!(fused.valence < 0.0);
    }

    #[test]
    fn test_heart_rate_stress_from_bpm() {
        assert_eq!(HeartRateSignal::from_bpm(100.0, 70.0, 0.8).stress, StressLevel::High);
        assert_eq!(HeartRateSignal::from_bpm(80.0, 70.0, 0.8).stress, StressLevel::Medium);
        assert_eq!(HeartRateSignal::from_bpm(72.0, 70.0, 0.8).stress, StressLevel::Low);
    }

    fn label_strategy() -> impl Strategy<Value = Emotion> {
        (0usize..7).prop_map(|i| Emotion::ALL[i])
    }

    fn modality_strategy() -> impl Strategy<Value = Option<Vec<EmotionScore>>> {
        proptest::option::of(proptest::collection::vec(
            (label_strategy(), 0.0f64..=1.0).prop_map(|(l, c)| EmotionScore::new(l, c)),
            1..5,
        ))
    }

    fn inputs_strategy() -> impl Strategy<Value = ModalityInputs> {
        (
            modality_strategy(),
            modality_strategy(),
            modality_strategy(),
            proptest::option::of((0usize..3, 0.0f64..=1.0)),
        )
            .prop_map(|(face, voice, text, heart)| ModalityInputs {
                face,
                voice,
                text,
                heart_rate: heart.map(|(level, confidence)| {
                    let stress = [StressLevel::Low, StressLevel::Medium, StressLevel::High][level];
                    HeartRateSignal::new(stress, confidence)
                }),
            })
    }

    proptest! {
        #[test]
        fn prop_weights_sum_to_one(inputs in inputs_strategy()) {
            let fusion = EmotionFusion::default();
            let weights = fusion.compute_weights(&inputs);
            prop_assert!((weights.sum() - 1.0).abs() < 1e-6);
        }

        #[test]
        fn prop_absent_modality_has_zero_weight(inputs in inputs_strategy()) {
            let fusion = EmotionFusion::default();
            let weights = fusion.compute_weights(&inputs);
            let present = inputs.present_modalities();
            let fallback = fusion.config().fallback_weights.normalised();
            for modality in Modality::ALL {
                if present.is_empty() {
                    prop_assert_eq!(weights.get(modality), fallback.get(modality));
                } else if !present.contains(&modality) {
                    prop_assert_eq!(weights.get(modality), 0.0);
                }
            }
        }

        #[test]
        fn prop_fusion_is_deterministic(inputs in inputs_strategy()) {
            let fusion = EmotionFusion::default();
            let first = fusion.fuse_inputs(&inputs);
            let second = fusion.fuse_inputs(&inputs);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_fused_confidence_is_unit(inputs in inputs_strategy()) {
            let fusion = EmotionFusion::default();
            let fused = fusion.fuse_inputs(&inputs);
            prop_assert!((0.0..=1.0).contains(&fused.score.confidence));
        }
    }
}
