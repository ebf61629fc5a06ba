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

use super::fusion::ModalityInputs;
use super::{Emotion, EmotionScore, Modality};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModalityPayload {
    Image(Vec<u8>),
    Audio(Vec<u8>),
    Text(String),
}

impl ModalityPayload {
    pub fn modality(&self) -> Modality {
        match self {
            ModalityPayload::Image(_) => Modality::Face,
            ModalityPayload::Audio(_) => Modality::Voice,
            ModalityPayload::Text(_) => Modality::Text,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// An externally trained emotion model for one modality.
#[async_trait::async_trait]
pub trait ModalityClassifier: Send + Sync {
    fn modality(&self) -> Modality;

    async fn classify(
        &self,
        payload: &ModalityPayload,
    ) -> Result<Vec<EmotionScore>, ClassifierError>;
}

/// Clamps confidences and orders by descending confidence, canonical label
/// order on ties.
pub fn normalise_scores(scores: Vec<EmotionScore>) -> Vec<EmotionScore> {
    let mut scores: Vec<EmotionScore> = scores
        .into_iter()
        .map(|score| EmotionScore::new(score.label, score.confidence))
        .collect();
    scores.sort_by_key(|score| score.label.index());
    scores.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scores
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationReport {
    pub inputs: ModalityInputs,
    pub unavailable: Vec<(Modality, String)>,
}

#[derive(Clone)]
pub struct ClassifierSet {
    classifiers: HashMap<Modality, Arc<dyn ModalityClassifier>>,
    timeout: Duration,
}

impl fmt::Debug for ClassifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modalities: Vec<String> =
            self.classifiers.keys().map(ToString::to_string).collect();
        modalities.sort();
        f.debug_struct("ClassifierSet")
            .field("modalities", &modalities)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClassifierSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            classifiers: HashMap::new(),
            timeout,
        }
    }

    /// Ships with the lexicon text analyser so text-only sessions work
    /// without external models.
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut set = Self::new(timeout);
        set.register(Arc::new(LexiconTextAnalyser::default()));
        set
    }

    pub fn register(&mut self, classifier: Arc<dyn ModalityClassifier>) {
        self.classifiers.insert(classifier.modality(), classifier);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn has(&self, modality: Modality) -> bool {
        self.classifiers.contains_key(&modality)
    }

    /// Runs every payload through its classifier concurrently. A missing,
    /// failing or slow classifier leaves its modality absent.
    pub async fn classify_all(&self, payloads: Vec<ModalityPayload>) -> ClassificationReport {
        let timeout = self.timeout;
        let calls = payloads.into_iter().map(|payload| {
            let modality = payload.modality();
            let classifier = self.classifiers.get(&modality).cloned();
            async move {
                let result = match classifier {
                    None => Err(ClassifierError::Unavailable(format!(
                        "no {modality} classifier registered"
                    ))),
                    Some(classifier) => {
                        match tokio::time::timeout(timeout, classifier.classify(&payload)).await {
                            Ok(result) => result,
                            Err(_) => Err(ClassifierError::Unavailable(format!(
                                "timed out after {}ms",
                                timeout.as_millis()
                            ))),
                        }
                    }
                };
                (modality, result)
            }
        });

        let mut report = ClassificationReport::default();
        for (modality, result) in join_all(calls).await {
            match result {
                Ok(scores) => report
                    .inputs
                    .set_scores(modality, normalise_scores(scores)),
                Err(error) => report.unavailable.push((modality, error.to_string())),
            }
        }
        report
    }
}

/// Keyword lexicon text classifier. One hit gives 0.65, each further hit
/// adds 0.15 up to 0.95; text with no hit reads as neutral at 0.6.
#[derive(Debug, Clone)]
pub struct LexiconTextAnalyser {
    lexicon: Vec<(Emotion, Vec<String>)>,
    base_confidence: f64,
    per_hit: f64,
    max_confidence: f64,
}

impl Default for LexiconTextAnalyser {
    fn default() -> Self {
        let entries: [(Emotion, &[&str]); 7] = [
            (Emotion::Neutral, &["okay", "ok", "fine", "alright", "normal"]),
            (
                Emotion::Happy,
                &[
                    "happy", "glad", "joy", "joyful", "great", "wonderful", "excited",
                    "grateful", "relieved", "content", "good",
                ],
            ),
            (
                Emotion::Sad,
                &[
                    "sad", "down", "depressed", "unhappy", "lonely", "cry", "crying",
                    "miserable", "grief", "heartbroken", "hopeless",
                ],
            ),
            (
                Emotion::Angry,
                &[
                    "angry", "mad", "furious", "annoyed", "irritated", "frustrated", "rage",
                    "hate",
                ],
            ),
            (
                Emotion::Fearful,
                &[
                    "afraid", "scared", "anxious", "worried", "nervous", "panic", "fear",
                    "terrified", "frightened",
                ],
            ),
            (
                Emotion::Disgusted,
                &["disgusted", "gross", "revolted", "repulsed", "sick of"],
            ),
            (
                Emotion::Surprised,
                &["surprised", "shocked", "unexpected", "amazed", "astonished"],
            ),
        ];
        Self {
            lexicon: entries
                .into_iter()
                .map(|(emotion, words)| (emotion, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
            base_confidence: 0.5,
            per_hit: 0.15,
            max_confidence: 0.95,
        }
    }
}

impl LexiconTextAnalyser {
    pub fn with_keywords(mut self, emotion: Emotion, keywords: &[&str]) -> Self {
        let extra = keywords.iter().map(|k| k.to_lowercase());
        match self.lexicon.iter_mut().find(|(label, _)| *label == emotion) {
            Some((_, words)) => words.extend(extra),
            None => self.lexicon.push((emotion, extra.collect())),
        }
        self
    }

    pub fn analyse(&self, text: &str) -> Vec<EmotionScore> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|token| !token.is_empty())
            .collect();
        let joined = tokens.join(" ");

        let mut scores = Vec::new();
        for (emotion, keywords) in &self.lexicon {
            let hits = keywords
                .iter()
                .filter(|keyword| {
                    if keyword.contains(' ') {
                        joined.contains(keyword.as_str())
                    } else {
                        tokens.contains(&keyword.as_str())
                    }
                })
                .count();
            if hits > 0 {
                let confidence =
                    (self.base_confidence + self.per_hit * hits as f64).min(self.max_confidence);
                scores.push(EmotionScore::new(*emotion, confidence));
            }
        }

        if scores.is_empty() {
            return vec![EmotionScore::new(Emotion::Neutral, 0.6)];
        }
        normalise_scores(scores)
    }
}

#[async_trait::async_trait]
impl ModalityClassifier for LexiconTextAnalyser {
    fn modality(&self) -> Modality {
        Modality::Text
    }

    async fn classify(
        &self,
        payload: &ModalityPayload,
    ) -> Result<Vec<EmotionScore>, ClassifierError> {
        match payload {
            ModalityPayload::Text(text) => Ok(self.analyse(text)),
            other => Err(ClassifierError::InvalidPayload(format!(
                "text analyser cannot read {} payloads",
                other.modality()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingClassifier;

    #[async_trait::async_trait]
    impl ModalityClassifier for FailingClassifier {
        fn modality(&self) -> Modality {
            Modality::Face
        }

        async fn classify(
            &self,
            _payload: &ModalityPayload,
        ) -> Result<Vec<EmotionScore>, ClassifierError> {
            Err(ClassifierError::Inference("model crashed".to_string()))
        }
    }

    struct SlowClassifier;

    #[async_trait::async_trait]
    impl ModalityClassifier for SlowClassifier {
        fn modality(&self) -> Modality {
            Modality::Voice
        }

        async fn classify(
            &self,
            _payload: &ModalityPayload,
        ) -> Result<Vec<EmotionScore>, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![EmotionScore::new(Emotion::Happy, 0.9)])
        }
    }

    #[test]
    fn test_lexicon_reads_sadness() {
        let analyser = LexiconTextAnalyser::default();
        let scores = analyser.analyse("I feel sad");
        assert_eq!(scores[0].label, Emotion::Sad);
        assert!((scores[0].confidence - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_lexicon_without_hits_is_neutral() {
        let analyser = LexiconTextAnalyser::default();
        let scores = analyser.analyse("The meeting moved to Thursday");
        assert_eq!(scores, vec![EmotionScore::new(Emotion::Neutral, 0.6)]);
    }

    #[test]
    fn test_lexicon_orders_by_hits() {
        let analyser = LexiconTextAnalyser::default();
        let scores = analyser.analyse("I'm scared and anxious, a bit sad too");
        assert_eq!(scores[0].label, Emotion::Fearful);
        assert_eq!(scores[1].label, Emotion::Sad);
        assert!(scores[0].confidence > scores[1].confidence);
    }

    #[test]
    fn test_custom_keywords() {
        let analyser =
            LexiconTextAnalyser::default().with_keywords(Emotion::Happy, &["Blissful"]);
        assert_eq!(analyser.analyse("blissful morning")[0].label, Emotion::Happy);
    }

    #[test]
    fn test_normalise_scores_sorts_and_clamps() {
        let scores = normalise_scores(vec![
            EmotionScore { label: Emotion::Sad, confidence: 0.2 },
            EmotionScore { label: Emotion::Happy, confidence: 1.4 },
            EmotionScore { label: Emotion::Angry, confidence: 0.2 },
        ]);
        assert_eq!(scores[0], EmotionScore::new(Emotion::Happy, 1.0));
        assert_eq!(scores[1].label, Emotion::Sad);
        assert_eq!(scores[2].label, Emotion::Angry);
    }

    #[tokio::test]
    async fn test_failed_modalities_are_absent() {
        let mut set = ClassifierSet::with_defaults(Duration::from_millis(50));
        set.register(Arc::new(FailingClassifier));
        set.register(Arc::new(SlowClassifier));

        let report = set
            .classify_all(vec![
                ModalityPayload::Image(vec![0; 4]),
                ModalityPayload::Audio(vec![0; 4]),
                ModalityPayload::Text("so happy today".to_string()),
            ])
            .await;

        assert!(report.inputs.face.is_none());
        assert!(report.inputs.voice.is_none());
        assert_eq!(report.inputs.text.as_ref().unwrap()[0].label, Emotion::Happy);
        let missing: Vec<Modality> = report.unavailable.iter().map(|(m, _)| *m).collect();
        assert!(missing.contains(&Modality::Face));
        assert!(missing.contains(&Modality::Voice));
    }

    #[tokio::test]
    async fn test_unregistered_modality_is_reported() {
        let set = ClassifierSet::new(Duration::from_millis(50));
        let report = set
            .classify_all(vec![ModalityPayload::Text("hello".to_string())])
            .await;
        assert!(report.inputs.text.is_none());
        assert_eq!(report.unavailable.len(), 1);
    }
}
