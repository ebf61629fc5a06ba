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

//! Adaptive personalisation engine for music-based therapeutic sessions.
//!
//! Per-modality emotion estimates are fused into one state signal, a tabular
//! Q-learning policy picks a music intervention for that state, and the
//! outcome of each session feeds back into the user's profile. A keyword
//! crisis detector can replace the policy's choice at any decision point.

pub mod analytics;
pub mod config;
pub mod emotion;
pub mod error;
pub mod logging;
pub mod music;
pub mod orchestration;
pub mod policy;
pub mod profile;
pub mod safety;
pub mod session;

pub use analytics::{compare_conditions, ConditionComparison, ProfileSummary};
pub use config::{
    CrisisConfig, EngineConfig, FusionConfig, LearningConfig, ModalityReliability, SessionConfig,
    StorageConfig,
};
pub use emotion::{
    arousal, valence, ClassifierError, ClassifierSet, Emotion, EmotionFusion, EmotionScore,
    FusedEmotion, FusionWeights, HeartRateSignal, LexiconTextAnalyser, Modality,
    ModalityClassifier, ModalityInputs, ModalityPayload, StressLevel,
};
pub use error::{EngineError, EngineResult, FailureRoute};
pub use music::{MusicConfig, MusicSelection};
pub use orchestration::{
    ConsentGate, ConsentPurpose, CrisisAuditHandler, EngineEvent, EventCategory, EventHandler,
    EventLevel, EventSubscriber, EventSystem, EventType, FileProfileStore, InMemoryProfileStore,
    LoggerEventHandler, MonitorOutcome, MonitorReport, OrchestratorBuilder, OrchestratorPhase,
    OrchestratorRegistry, ProfileStore, SessionDecision, SessionInput, StaticConsent,
    TherapyOrchestrator,
};
pub use policy::{
    possible_actions, reward, EmotionState, MusicAction, QLearningPolicy, QTable, QUpdate,
    TimeOfDay, TransitionSpeed,
};
pub use profile::{SessionOutcome, UserProfile};
pub use safety::{
    CrisisDetectionResult, CrisisDetector, CrisisEvent, CrisisLevel, CrisisResource,
    ReferralRecommendation,
};
pub use session::{
    ActiveSession, AffectScores, EmotionObservation, MusicSegment, SessionTracker,
};

/// Builds an orchestrator for one user from a configuration and the two
/// capabilities every deployment must supply.
pub async fn create_orchestrator(
    user_id: impl Into<String>,
    config: EngineConfig,
    consent: std::sync::Arc<dyn ConsentGate>,
    store: std::sync::Arc<dyn ProfileStore>,
) -> EngineResult<TherapyOrchestrator> {
    TherapyOrchestrator::builder(user_id)
        .config(config)
        .consent(consent)
        .store(store)
        .build()
        .await
}
