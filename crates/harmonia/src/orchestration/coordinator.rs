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

use super::{
    consent::{ConsentGate, ConsentPurpose, StaticConsent},
    event_system::{EngineEvent, EventSubscriber, EventSystem, EventType, LoggerEventHandler},
    profile_store::{InMemoryProfileStore, ProfileStore},
};
use crate::config::EngineConfig;
use crate::emotion::{
    ClassifierSet, EmotionFusion, EmotionScore, FusedEmotion, HeartRateSignal, Modality,
    ModalityClassifier, ModalityInputs, ModalityPayload,
};
use crate::error::{EngineError, EngineResult, FailureRoute};
use crate::logging::{log_degraded, log_error, log_fusion_event};
use crate::music::{MusicConfig, MusicSelection};
use crate::policy::{possible_actions, EmotionState, QLearningPolicy, TimeOfDay};
use crate::profile::{SessionOutcome, UserProfile};
use crate::safety::{CrisisDetectionResult, CrisisDetector, CrisisLevel, ReferralRecommendation};
use crate::session::{ActiveSession, AffectScores, MusicSegment, SessionTracker};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorPhase {
    Uninitialized,
    Initialized,
    Active,
    Terminated,
}

/// Evidence gathered at one decision point.
#[derive(Debug, Clone, Default)]
pub struct SessionInput {
    /// Raw payloads for the registered classifiers.
    pub payloads: Vec<ModalityPayload>,
    /// Scores already produced by external classifiers.
    pub scores: ModalityInputs,
    pub heart_rate: Option<HeartRateSignal>,
    /// Free text that is not a classifier payload, such as a speech
    /// transcript. Only scanned for crisis keywords.
    pub transcript: Option<String>,
}

impl SessionInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new().with_payload(ModalityPayload::Text(text.into()))
    }

    pub fn with_payload(mut self, payload: ModalityPayload) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn with_scores(mut self, modality: Modality, scores: Vec<EmotionScore>) -> Self {
        self.scores.set_scores(modality, scores);
        self
    }

    pub fn with_heart_rate(mut self, signal: HeartRateSignal) -> Self {
        self.heart_rate = Some(signal);
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    fn crisis_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .payloads
            .iter()
            .filter_map(|payload| match payload {
                ModalityPayload::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .chain(self.transcript.as_deref())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDecision {
    pub session_id: String,
    pub selection: MusicSelection,
    pub fused: FusedEmotion,
    pub state: EmotionState,
    pub crisis: CrisisDetectionResult,
    pub unavailable_modalities: Vec<Modality>,
}

impl SessionDecision {
    pub fn music_config(&self) -> MusicConfig {
        self.selection.to_config()
    }

    pub fn discloses_resources(&self) -> bool {
        !self.crisis.resources.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MonitorOutcome {
    Recorded,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub outcome: MonitorOutcome,
    pub fused: Option<FusedEmotion>,
    pub crisis: CrisisDetectionResult,
    pub selection: MusicSelection,
    /// True when this tick switched the live music to the override.
    pub override_applied: bool,
}

pub struct OrchestratorBuilder {
    user_id: String,
    config: EngineConfig,
    consent: Option<Arc<dyn ConsentGate>>,
    store: Option<Arc<dyn ProfileStore>>,
    classifiers: Vec<Arc<dyn ModalityClassifier>>,
    subscribers: Vec<(EventType, EventSubscriber)>,
    time_of_day: Option<TimeOfDay>,
    log_events: bool,
}

impl OrchestratorBuilder {
    fn new(user_id: String) -> Self {
        Self {
            user_id,
            config: EngineConfig::default(),
            consent: None,
            store: None,
            classifiers: Vec::new(),
            subscribers: Vec::new(),
            time_of_day: None,
            log_events: true,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn consent(mut self, consent: Arc<dyn ConsentGate>) -> Self {
        self.consent = Some(consent);
        self
    }

    pub fn store(mut self, store: Arc<dyn ProfileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the default classifier for the classifier's modality.
    pub fn classifier(mut self, classifier: Arc<dyn ModalityClassifier>) -> Self {
        self.classifiers.push(classifier);
        self
    }

    pub fn subscriber(mut self, event_type: EventType, subscriber: EventSubscriber) -> Self {
        self.subscribers.push((event_type, subscriber));
        self
    }

    /// Pins the time-of-day bucket instead of reading the local clock.
    pub fn time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.time_of_day = Some(time_of_day);
        self
    }

    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub async fn build(self) -> EngineResult<TherapyOrchestrator> {
        self.config.validate()?;

        let mut classifiers = ClassifierSet::with_defaults(self.config.session.classifier_timeout());
        for classifier in self.classifiers {
            classifiers.register(classifier);
        }

        let events = EventSystem::new();
        if self.log_events {
            events
                .subscribe(
                    EventType::All,
                    EventSubscriber::new("logger", Arc::new(LoggerEventHandler)),
                )
                .await;
        }
        for (event_type, subscriber) in self.subscribers {
            events.subscribe(event_type, subscriber).await;
        }

        let rng = match self.config.learning.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(TherapyOrchestrator {
            fusion: EmotionFusion::new(self.config.fusion.clone()),
            detector: CrisisDetector::new(self.config.crisis.clone()),
            policy: QLearningPolicy::new(&self.config.learning),
            consent: self
                .consent
                .unwrap_or_else(|| Arc::new(StaticConsent::DenyAll)),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryProfileStore::new())),
            user_id: self.user_id,
            config: self.config,
            phase: OrchestratorPhase::Uninitialized,
            classifiers,
            tracker: SessionTracker::new(),
            profile: None,
            events,
            rng,
            time_of_day: self.time_of_day,
            pending_save: false,
            crisis_in_flight: None,
        })
    }
}

/// The per-user state machine:
/// `Uninitialized -> Initialized -> Active -> Terminated`, and back to
/// `Active` for the next session.
pub struct TherapyOrchestrator {
    user_id: String,
    config: EngineConfig,
    phase: OrchestratorPhase,
    consent: Arc<dyn ConsentGate>,
    store: Arc<dyn ProfileStore>,
    classifiers: ClassifierSet,
    fusion: EmotionFusion,
    detector: CrisisDetector,
    policy: QLearningPolicy,
    tracker: SessionTracker,
    profile: Option<UserProfile>,
    events: EventSystem,
    rng: StdRng,
    time_of_day: Option<TimeOfDay>,
    pending_save: bool,
    crisis_in_flight: Option<CrisisLevel>,
}

impl TherapyOrchestrator {
    pub fn builder(user_id: impl Into<String>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(user_id.into())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn phase(&self) -> OrchestratorPhase {
        self.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn active_session(&self) -> Option<&ActiveSession> {
        self.tracker.active()
    }

    pub fn events(&self) -> &EventSystem {
        &self.events
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending_save
    }

    /// Where the caller should go for `error`, taking into account the
    /// most severe crisis seen since the current session started.
    pub fn route_error(&self, error: &EngineError) -> FailureRoute {
        error.route_with_crisis(self.crisis_in_flight)
    }

    fn current_time_of_day(&self) -> TimeOfDay {
        self.time_of_day.unwrap_or_else(TimeOfDay::now)
    }

    fn expect_phase(&self, allowed: &[OrchestratorPhase], operation: &str) -> EngineResult<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(EngineError::IllegalState(format!(
                "{operation} is not allowed in phase {:?}",
                self.phase
            )))
        }
    }

    async fn fail(&self, error: EngineError) -> EngineError {
        log_error("orchestrator", &error);
        self.events
            .emit(EngineEvent::ErrorOccurred {
                user_id: self.user_id.clone(),
                error: error.clone(),
                timestamp: Utc::now(),
            })
            .await;
        error
    }

    /// Checks consent and loads (or creates) the user's profile.
    pub async fn initialize(&mut self) -> EngineResult<()> {
        if self.phase == OrchestratorPhase::Initialized {
            return Ok(());
        }
        self.expect_phase(&[OrchestratorPhase::Uninitialized], "initialize")?;

        for purpose in ConsentPurpose::REQUIRED {
            if !self.consent.has_consent(&self.user_id, purpose).await {
                let error = EngineError::ConsentRequired {
                    user_id: self.user_id.clone(),
                    purpose: purpose.to_string(),
                };
                return Err(self.fail(error).await);
            }
        }

        let now = Utc::now();
        let (profile, new_profile) = match self.store.load_profile(&self.user_id).await {
            Ok(Some(profile)) => (profile, false),
            Ok(None) => (
                UserProfile::new(
                    self.user_id.clone(),
                    self.config.learning.initial_exploration_rate,
                    now,
                ),
                true,
            ),
            Err(error) => return Err(self.fail(error).await),
        };
        self.profile = Some(profile);
        self.phase = OrchestratorPhase::Initialized;

        info!(user_id = %self.user_id, new_profile, "Orchestrator initialised");
        self.events
            .emit(EngineEvent::OrchestratorInitialised {
                user_id: self.user_id.clone(),
                new_profile,
                timestamp: now,
            })
            .await;
        Ok(())
    }

    /// Scans `text` for crisis keywords. Allowed in every phase.
    pub async fn check_crisis(&mut self, text: &str) -> CrisisDetectionResult {
        self.assess_crisis(text, None).await
    }

    async fn assess_crisis(&mut self, text: &str, session_id: Option<String>) -> CrisisDetectionResult {
        let now = Utc::now();
        let result = self.detector.assess(&self.user_id, text, now);
        self.crisis_in_flight = self.crisis_in_flight.max(Some(result.level));
        if result.is_crisis() {
            self.events
                .emit(EngineEvent::CrisisDetected {
                    user_id: self.user_id.clone(),
                    session_id,
                    level: result.level,
                    matched_keywords: result.matched_keywords.clone(),
                    timestamp: now,
                })
                .await;
        }
        result
    }

    pub fn referral(&self) -> ReferralRecommendation {
        self.detector.referral(&self.user_id, Utc::now())
    }

    async fn gather_inputs(&self, input: SessionInput) -> (ModalityInputs, Vec<Modality>) {
        let SessionInput {
            payloads,
            scores,
            heart_rate,
            ..
        } = input;
        let report = self.classifiers.classify_all(payloads).await;

        let mut inputs = scores;
        for modality in [Modality::Face, Modality::Voice, Modality::Text] {
            if let Some(classified) = report.inputs.scores(modality) {
                inputs.set_scores(modality, classified.to_vec());
            }
        }
        if heart_rate.is_some() {
            inputs.heart_rate = heart_rate;
        }

        let mut unavailable = Vec::new();
        for (modality, reason) in report.unavailable {
            if inputs.scores(modality).is_some() {
                continue;
            }
            let error = EngineError::ModalityUnavailable { modality, reason };
            log_degraded(&self.user_id, &error);
            self.events
                .emit(EngineEvent::ModalityUnavailable {
                    user_id: self.user_id.clone(),
                    error,
                    timestamp: Utc::now(),
                })
                .await;
            unavailable.push(modality);
        }
        (inputs, unavailable)
    }

    fn fuse(&self, inputs: &ModalityInputs) -> FusedEmotion {
        let fused = self.fusion.fuse_inputs(inputs);
        log_fusion_event(&self.user_id, &fused.score, &fused.weights);
        fused
    }

    /// Detect, fuse, crisis-check, select, then begin tracking.
    pub async fn start(&mut self, input: SessionInput) -> EngineResult<SessionDecision> {
        self.expect_phase(
            &[OrchestratorPhase::Initialized, OrchestratorPhase::Terminated],
            "start",
        )?;
        self.crisis_in_flight = None;

        let crisis = match input.crisis_text() {
            Some(text) => self.assess_crisis(&text, None).await,
            None => CrisisDetectionResult::none(),
        };

        let (inputs, unavailable_modalities) = self.gather_inputs(input).await;
        let fused = self.fuse(&inputs);
        let time_of_day = self.current_time_of_day();
        let state = EmotionState::from_fused(&fused, 0.0, time_of_day);

        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| EngineError::IllegalState("start without a loaded profile".to_string()))?;
        let override_active = self.detector.requires_override(&crisis);
        let selection = if override_active {
            MusicSelection::CrisisOverride(MusicConfig::crisis_calming())
        } else {
            let actions = possible_actions(state.current_emotion);
            let action = self.policy.select(
                &state,
                &actions,
                &profile.q_table,
                profile.exploration_rate,
                &mut self.rng,
            )?;
            MusicSelection::Adaptive(action)
        };

        let now = Utc::now();
        let session_id = self
            .tracker
            .start(&self.user_id, &fused, state.clone(), selection.clone(), now)?
            .session_id
            .clone();
        self.tracker.note_crisis_level(crisis.level)?;
        self.phase = OrchestratorPhase::Active;

        self.events
            .emit(EngineEvent::SessionStarted {
                user_id: self.user_id.clone(),
                session_id: session_id.clone(),
                emotion: fused.score,
                selection: selection.clone(),
                timestamp: now,
            })
            .await;
        if override_active {
            self.events
                .emit(EngineEvent::CrisisOverrideApplied {
                    user_id: self.user_id.clone(),
                    session_id: session_id.clone(),
                    level: crisis.level,
                    timestamp: now,
                })
                .await;
        }

        Ok(SessionDecision {
            session_id,
            selection,
            fused,
            state,
            crisis,
            unavailable_modalities,
        })
    }

    /// One periodic tick. The crisis check runs first and may switch the
    /// live music; a tick that times out or carries no evidence is skipped
    /// without touching the emotion history.
    pub async fn monitor(&mut self, input: SessionInput) -> EngineResult<MonitorReport> {
        self.expect_phase(&[OrchestratorPhase::Active], "monitor")?;
        let session_id = self
            .tracker
            .active()
            .map(|session| session.session_id.clone())
            .ok_or_else(|| EngineError::IllegalState("monitor without an active session".to_string()))?;

        let crisis = match input.crisis_text() {
            Some(text) => self.assess_crisis(&text, Some(session_id.clone())).await,
            None => CrisisDetectionResult::none(),
        };
        self.tracker.note_crisis_level(crisis.level)?;

        let mut override_applied = false;
        if self.detector.requires_override(&crisis) {
            override_applied = self.tracker.apply_override(MusicConfig::crisis_calming())?;
            if override_applied {
                self.events
                    .emit(EngineEvent::CrisisOverrideApplied {
                        user_id: self.user_id.clone(),
                        session_id: session_id.clone(),
                        level: crisis.level,
                        timestamp: Utc::now(),
                    })
                    .await;
            }
        }

        let tick_timeout = self.config.session.tick_timeout();
        let gathered = tokio::time::timeout(tick_timeout, self.gather_inputs(input)).await;
        let skip_reason = match &gathered {
            Err(_) => Some(format!("tick timed out after {}ms", tick_timeout.as_millis())),
            Ok((inputs, _)) if !inputs.has_evidence() => Some("no modality evidence".to_string()),
            Ok(_) => None,
        };

        let (outcome, fused) = match (skip_reason, gathered) {
            (None, Ok((inputs, _))) => {
                let fused = self.fuse(&inputs);
                let now = Utc::now();
                self.tracker.record_emotion(&fused, now)?;
                self.events
                    .emit(EngineEvent::EmotionRecorded {
                        user_id: self.user_id.clone(),
                        session_id: session_id.clone(),
                        emotion: fused.score,
                        valence: fused.valence,
                        timestamp: now,
                    })
                    .await;
                (MonitorOutcome::Recorded, Some(fused))
            }
            (reason, _) => {
                let reason = reason.unwrap_or_else(|| "tick skipped".to_string());
                self.events
                    .emit(EngineEvent::MonitorSkipped {
                        user_id: self.user_id.clone(),
                        session_id: session_id.clone(),
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    })
                    .await;
                (MonitorOutcome::Skipped { reason }, None)
            }
        };

        let selection = self
            .tracker
            .active()
            .map(|session| session.selection.clone())
            .ok_or_else(|| EngineError::IllegalState("session closed during monitor".to_string()))?;

        Ok(MonitorReport {
            outcome,
            fused,
            crisis,
            selection,
            override_applied,
        })
    }

    pub fn record_music_segment(&mut self, segment: MusicSegment) -> EngineResult<()> {
        self.expect_phase(&[OrchestratorPhase::Active], "record_music_segment")?;
        self.tracker.record_music_segment(segment)
    }

    /// Computes reward, updates the policy once, decays exploration and
    /// persists the profile. If the save fails the session is still
    /// closed; `persist_profile` retries the save.
    pub async fn end(&mut self, affect: Option<AffectScores>) -> EngineResult<SessionOutcome> {
        self.expect_phase(&[OrchestratorPhase::Active], "end")?;
        let profile = self
            .profile
            .as_mut()
            .ok_or_else(|| EngineError::IllegalState("end without a loaded profile".to_string()))?;

        let time_of_day = self.time_of_day.unwrap_or_else(TimeOfDay::now);
        let now = Utc::now();
        let (outcome, update) =
            self.tracker
                .end(profile, &self.policy, affect, now, time_of_day)?;
        let exploration_rate = profile.exploration_rate;
        self.phase = OrchestratorPhase::Terminated;
        self.pending_save = true;

        self.events
            .emit(EngineEvent::PolicyUpdated {
                user_id: self.user_id.clone(),
                update,
                exploration_rate,
                timestamp: now,
            })
            .await;
        self.events
            .emit(EngineEvent::SessionEnded {
                user_id: self.user_id.clone(),
                session_id: outcome.session_id.clone(),
                reward: outcome.reward,
                improvement: outcome.improvement,
                timestamp: now,
            })
            .await;

        self.save_profile().await?;
        Ok(outcome)
    }

    /// Saves the whole profile. Safe to repeat. A crisis seen in the
    /// finished session no longer decides how a failed retry is routed.
    pub async fn persist_profile(&mut self) -> EngineResult<()> {
        self.crisis_in_flight = None;
        self.save_profile().await
    }

    async fn save_profile(&mut self) -> EngineResult<()> {
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| EngineError::IllegalState("no profile loaded".to_string()))?;

        if let Err(error) = self.store.save_profile(profile).await {
            return Err(self.fail(error).await);
        }
        self.pending_save = false;
        self.events
            .emit(EngineEvent::ProfilePersisted {
                user_id: self.user_id.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Emotion;

    async fn ready(user_id: &str) -> TherapyOrchestrator {
        let mut config = EngineConfig::default();
        config.learning.seed = Some(11);
        let mut orchestrator = TherapyOrchestrator::builder(user_id)
            .config(config)
            .consent(Arc::new(StaticConsent::AllowAll))
            .time_of_day(TimeOfDay::Afternoon)
            .log_events(false)
            .build()
            .await
            .unwrap();
        orchestrator.initialize().await.unwrap();
        orchestrator
    }

    #[tokio::test]
    async fn test_default_consent_denies() {
        let mut orchestrator = TherapyOrchestrator::builder("u1").build().await.unwrap();
        let error = orchestrator.initialize().await.unwrap_err();
        assert!(matches!(error, EngineError::ConsentRequired { .. }));
        assert_eq!(orchestrator.route_error(&error), FailureRoute::CollectConsent);
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_start_before_initialize_is_illegal() {
        let mut orchestrator = TherapyOrchestrator::builder("u1")
            .consent(Arc::new(StaticConsent::AllowAll))
            .build()
            .await
            .unwrap();
        let result = orchestrator.start(SessionInput::text("hello")).await;
        assert!(matches!(result, Err(EngineError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_phases_follow_the_session() {
        let mut orchestrator = ready("u1").await;
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Initialized);

        orchestrator.start(SessionInput::text("I feel happy")).await.unwrap();
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Active);
        assert!(matches!(
            orchestrator.start(SessionInput::text("again")).await,
            Err(EngineError::IllegalState(_))
        ));

        orchestrator.end(None).await.unwrap();
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Terminated);
        assert!(!orchestrator.has_pending_save());

        orchestrator.start(SessionInput::text("I feel fine")).await.unwrap();
        assert_eq!(orchestrator.phase(), OrchestratorPhase::Active);
    }

    #[tokio::test]
    async fn test_monitor_without_evidence_is_skipped() {
        let mut orchestrator = ready("u1").await;
        orchestrator.start(SessionInput::text("I feel sad")).await.unwrap();

        let report = orchestrator.monitor(SessionInput::new()).await.unwrap();
        assert!(matches!(report.outcome, MonitorOutcome::Skipped { .. }));
        assert_eq!(orchestrator.active_session().unwrap().observations.len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_modality_is_reported_as_error_event() {
        let mut orchestrator = ready("u1").await;
        let mut receiver = orchestrator.events().get_event_receiver();

        let input = SessionInput::text("I feel happy")
            .with_payload(ModalityPayload::Image(vec![0u8; 4]));
        let decision = orchestrator.start(input).await.unwrap();
        assert_eq!(decision.unavailable_modalities, vec![Modality::Face]);

        let mut reported = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if let EngineEvent::ModalityUnavailable { error, .. } = event {
                reported.push(error);
            }
        }
        assert_eq!(reported.len(), 1);
        assert!(matches!(
            &reported[0],
            EngineError::ModalityUnavailable {
                modality: Modality::Face,
                ..
            }
        ));
        assert!(reported[0].is_recoverable());
    }

    #[tokio::test]
    async fn test_monitor_records_emotion() {
        let mut orchestrator = ready("u1").await;
        orchestrator.start(SessionInput::text("I feel sad")).await.unwrap();

        let input = SessionInput::new()
            .with_scores(Modality::Face, vec![EmotionScore::new(Emotion::Happy, 0.8)]);
        let report = orchestrator.monitor(input).await.unwrap();
        assert_eq!(report.outcome, MonitorOutcome::Recorded);
        assert_eq!(report.fused.unwrap().score.label, Emotion::Happy);
        assert_eq!(orchestrator.active_session().unwrap().observations.len(), 2);
    }
}
