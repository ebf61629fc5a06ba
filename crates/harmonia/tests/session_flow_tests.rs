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

use harmonia::{
    possible_actions, AffectScores, ClassifierError, Emotion, EmotionScore, EngineConfig,
    EngineError, FailureRoute, InMemoryProfileStore, Modality, ModalityClassifier,
    ModalityPayload, MonitorOutcome, MusicSegment, MusicSelection, OrchestratorPhase,
    SessionInput, StaticConsent, TherapyOrchestrator, TimeOfDay,
};
use std::sync::Arc;

struct BrokenVoiceModel;

#[async_trait::async_trait]
impl ModalityClassifier for BrokenVoiceModel {
    fn modality(&self) -> Modality {
        Modality::Voice
    }

    async fn classify(
        &self,
        _payload: &ModalityPayload,
    ) -> Result<Vec<EmotionScore>, ClassifierError> {
        Err(ClassifierError::Unavailable("microphone disconnected".to_string()))
    }
}

fn seeded_config(seed: u64) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.learning.seed = Some(seed);
    config
}

async fn orchestrator_for(user_id: &str, config: EngineConfig) -> TherapyOrchestrator {
    let mut orchestrator = TherapyOrchestrator::builder(user_id)
        .config(config)
        .consent(Arc::new(StaticConsent::granted().grant_all(user_id)))
        .store(Arc::new(InMemoryProfileStore::new()))
        .time_of_day(TimeOfDay::Evening)
        .build()
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();
    orchestrator
}

#[tokio::test]
async fn test_sad_text_round_trip() {
    let mut orchestrator = orchestrator_for("alice", seeded_config(5)).await;

    let decision = orchestrator
        .start(SessionInput::text("I feel sad"))
        .await
        .unwrap();

    assert_eq!(decision.fused.score.label, Emotion::Sad);
    assert!((decision.fused.weights.text - 1.0).abs() < 1e-9);
    assert!((decision.fused.score.confidence - 0.65).abs() < 1e-9);
    assert!((decision.fused.valence - (-0.8 * 0.65)).abs() < 1e-9);

    let MusicSelection::Adaptive(action) = &decision.selection else {
        panic!("expected an adaptive selection, got {:?}", decision.selection);
    };
    assert!(possible_actions(Emotion::Sad).contains(action));

    let state_key = decision.state.state_key();
    let action_key = action.action_key();
    let before = orchestrator
        .profile()
        .unwrap()
        .q_table
        .get(&state_key, &action_key);

    let report = orchestrator
        .monitor(SessionInput::text("I feel happy and relieved"))
        .await
        .unwrap();
    assert_eq!(report.outcome, MonitorOutcome::Recorded);

    let outcome = orchestrator.end(None).await.unwrap();
    assert!(outcome.post_valence > outcome.pre_valence);
    assert!(outcome.reward > 0.0);

    let profile = orchestrator.profile().unwrap();
    assert!(profile.q_table.get(&state_key, &action_key) > before);
    assert_eq!(profile.total_updates, 1);
    assert!((profile.exploration_rate - 0.2985).abs() < 1e-12);
    assert_eq!(orchestrator.phase(), OrchestratorPhase::Terminated);
}

#[tokio::test]
async fn test_face_only_input_passes_through_unchanged() {
    let mut orchestrator = orchestrator_for("bob", seeded_config(1)).await;

    let input = SessionInput::new()
        .with_scores(Modality::Face, vec![EmotionScore::new(Emotion::Happy, 0.9)]);
    let decision = orchestrator.start(input).await.unwrap();

    assert_eq!(decision.fused.weights.face, 1.0);
    assert_eq!(decision.fused.weights.voice, 0.0);
    assert_eq!(decision.fused.weights.text, 0.0);
    assert_eq!(decision.fused.weights.heart_rate, 0.0);
    assert_eq!(decision.fused.score, EmotionScore::new(Emotion::Happy, 0.9));
}

#[tokio::test]
async fn test_failed_classifier_is_treated_as_absent() {
    let mut orchestrator = TherapyOrchestrator::builder("carol")
        .config(seeded_config(2))
        .consent(Arc::new(StaticConsent::AllowAll))
        .classifier(Arc::new(BrokenVoiceModel))
        .build()
        .await
        .unwrap();
    orchestrator.initialize().await.unwrap();

    let input = SessionInput::text("I am so angry and frustrated")
        .with_payload(ModalityPayload::Audio(vec![0u8; 16]));
    let decision = orchestrator.start(input).await.unwrap();

    assert_eq!(decision.unavailable_modalities, vec![Modality::Voice]);
    assert_eq!(decision.fused.weights.voice, 0.0);
    assert_eq!(decision.fused.score.label, Emotion::Angry);
}

#[tokio::test]
async fn test_illegal_orderings_fail_loudly() {
    let mut orchestrator = orchestrator_for("dave", seeded_config(3)).await;

    let error = orchestrator
        .monitor(SessionInput::text("hello"))
        .await
        .unwrap_err();
    assert!(matches!(error, EngineError::IllegalState(_)));
    assert!(!error.is_recoverable());

    assert!(matches!(
        orchestrator.end(None).await,
        Err(EngineError::IllegalState(_))
    ));

    orchestrator.start(SessionInput::text("fine")).await.unwrap();
    orchestrator.end(None).await.unwrap();
    assert!(matches!(
        orchestrator.end(None).await,
        Err(EngineError::IllegalState(_))
    ));
    assert_eq!(orchestrator.profile().unwrap().history.len(), 1);
}

#[tokio::test]
async fn test_consent_is_required_to_initialise() {
    let mut orchestrator = TherapyOrchestrator::builder("erin")
        .consent(Arc::new(
            StaticConsent::granted().grant("erin", harmonia::ConsentPurpose::EmotionAnalysis),
        ))
        .build()
        .await
        .unwrap();

    let error = orchestrator.initialize().await.unwrap_err();
    match &error {
        EngineError::ConsentRequired { user_id, purpose } => {
            assert_eq!(user_id, "erin");
            assert_eq!(purpose, "adaptive_personalisation");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(orchestrator.route_error(&error), FailureRoute::CollectConsent);

    // A severe crisis observed in the same step wins over the consent route.
    let crisis = orchestrator.check_crisis("I am thinking about suicide").await;
    assert!(!crisis.resources.is_empty());
    assert_eq!(
        orchestrator.route_error(&error),
        FailureRoute::DiscloseResources
    );
}

#[tokio::test]
async fn test_questionnaire_scores_feed_reward() {
    let mut orchestrator = orchestrator_for("frank", seeded_config(4)).await;
    orchestrator.start(SessionInput::text("okay")).await.unwrap();

    let outcome = orchestrator
        .end(Some(AffectScores::new(30.0, 14.0)))
        .await
        .unwrap();

    assert_eq!(outcome.pre_panas, Some(30.0));
    assert!(outcome.reward < 0.0);
}

#[tokio::test]
async fn test_segments_are_counted_in_outcome() {
    let mut orchestrator = orchestrator_for("gina", seeded_config(6)).await;
    let decision = orchestrator
        .start(SessionInput::text("I feel down"))
        .await
        .unwrap();

    for _ in 0..3 {
        orchestrator
            .record_music_segment(MusicSegment::new(
                decision.selection.clone(),
                chrono::Utc::now(),
                60.0,
            ))
            .unwrap();
    }
    let outcome = orchestrator.end(None).await.unwrap();
    assert_eq!(outcome.segment_count, 3);

    assert!(matches!(
        orchestrator.record_music_segment(MusicSegment::new(
            decision.selection,
            chrono::Utc::now(),
            60.0,
        )),
        Err(EngineError::IllegalState(_))
    ));
}

#[tokio::test]
async fn test_exploration_decays_across_sessions() {
    let mut orchestrator = orchestrator_for("hana", seeded_config(8)).await;
    let mut expected = 0.3;
    for _ in 0..5 {
        orchestrator.start(SessionInput::text("fine")).await.unwrap();
        orchestrator.end(None).await.unwrap();
        expected *= 0.995;
    }
    let profile = orchestrator.profile().unwrap();
    assert!((profile.exploration_rate - expected).abs() < 1e-12);
    assert_eq!(profile.history.len(), 5);
}
