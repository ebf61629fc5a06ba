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

use super::{ActiveSession, AffectScores, EmotionObservation, MusicSegment};
use crate::emotion::FusedEmotion;
use crate::error::{EngineError, EngineResult};
use crate::logging::log_session_event;
use crate::music::{MusicConfig, MusicSelection};
use crate::policy::{possible_actions, reward, EmotionState, QLearningPolicy, QUpdate, TimeOfDay};
use crate::profile::{SessionOutcome, UserProfile};
use crate::safety::CrisisLevel;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

/// Owns at most one active session for one user.
#[derive(Debug, Default)]
pub struct SessionTracker {
    active: Option<ActiveSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    fn active_mut(&mut self, operation: &str) -> EngineResult<&mut ActiveSession> {
        self.active
            .as_mut()
            .ok_or_else(|| EngineError::IllegalState(format!("{operation} without an active session")))
    }

    /// Opens a session. The initial fused emotion becomes the first
    /// observation.
    pub fn start(
        &mut self,
        user_id: &str,
        initial: &FusedEmotion,
        state: EmotionState,
        selection: MusicSelection,
        now: DateTime<Utc>,
    ) -> EngineResult<&ActiveSession> {
        if let Some(active) = &self.active {
            return Err(EngineError::IllegalState(format!(
                "Session {} is already active",
                active.session_id
            )));
        }

        let session = ActiveSession {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            started_at: now,
            pre_emotion: initial.score,
            pre_valence: initial.valence,
            pre_arousal: initial.arousal,
            observations: vec![EmotionObservation::from_fused(initial, now)],
            state,
            action: selection.to_action(),
            crisis_override: selection.is_override(),
            selection,
            segments: Vec::new(),
            peak_crisis_level: CrisisLevel::None,
        };

        log_session_event(
            "session_started",
            &session.session_id,
            json!({
                "user_id": user_id,
                "state": session.state.state_key(),
                "action": session.action.action_key(),
                "crisis_override": session.crisis_override,
            }),
        );

        Ok(&*self.active.insert(session))
    }

    pub fn record_emotion(&mut self, fused: &FusedEmotion, now: DateTime<Utc>) -> EngineResult<()> {
        let session = self.active_mut("record_emotion")?;
        session
            .observations
            .push(EmotionObservation::from_fused(fused, now));
        Ok(())
    }

    pub fn record_music_segment(&mut self, segment: MusicSegment) -> EngineResult<()> {
        let session = self.active_mut("record_music_segment")?;
        session.segments.push(segment);
        Ok(())
    }

    pub fn note_crisis_level(&mut self, level: CrisisLevel) -> EngineResult<()> {
        let session = self.active_mut("note_crisis_level")?;
        session.peak_crisis_level = session.peak_crisis_level.max(level);
        Ok(())
    }

    /// Switches the live music to the override configuration. The (state,
    /// action) pair chosen at start keeps the credit.
    pub fn apply_override(&mut self, config: MusicConfig) -> EngineResult<bool> {
        let session = self.active_mut("apply_override")?;
        if session.selection == MusicSelection::CrisisOverride(config.clone()) {
            return Ok(false);
        }
        session.selection = MusicSelection::CrisisOverride(config);
        session.crisis_override = true;
        log_session_event(
            "crisis_override_applied",
            &session.session_id,
            json!({ "peak_level": session.peak_crisis_level.to_string() }),
        );
        Ok(true)
    }

    /// Closes the session: computes reward, applies one Q-learning update,
    /// decays exploration and appends the outcome to the profile. The
    /// session is discarded only if all of that succeeded.
    pub fn end(
        &mut self,
        profile: &mut UserProfile,
        policy: &QLearningPolicy,
        affect: Option<AffectScores>,
        now: DateTime<Utc>,
        time_of_day: TimeOfDay,
    ) -> EngineResult<(SessionOutcome, QUpdate)> {
        let session = self
            .active
            .as_ref()
            .ok_or_else(|| EngineError::IllegalState("end without an active session".to_string()))?;
        let last = session.latest_observation().ok_or_else(|| {
            EngineError::IllegalState(format!(
                "Session {} has no emotion observations",
                session.session_id
            ))
        })?;

        let duration_minutes = session.duration_minutes(now);
        let valence_reward = reward(session.pre_valence, last.valence);
        let session_reward = match affect {
            Some(scores) => 0.5 * (valence_reward + scores.reward()),
            None => valence_reward,
        };

        let next_state = EmotionState::new(
            last.emotion.label,
            last.valence,
            last.arousal,
            duration_minutes,
            time_of_day,
        );
        let next_actions = possible_actions(next_state.current_emotion);
        let update = policy.update(
            &mut profile.q_table,
            &session.state.state_key(),
            &session.action.action_key(),
            session_reward,
            &next_state.state_key(),
            &next_actions,
        )?;
        let exploration_rate = policy.decay(profile.exploration_rate);

        let outcome = SessionOutcome {
            session_id: session.session_id.clone(),
            started_at: session.started_at,
            ended_at: now,
            duration_minutes,
            pre_emotion: session.pre_emotion.label,
            post_emotion: last.emotion.label,
            pre_valence: session.pre_valence,
            post_valence: last.valence,
            improvement: last.valence - session.pre_valence,
            pre_panas: affect.map(|a| a.pre_panas),
            post_panas: affect.map(|a| a.post_panas),
            reward: session_reward,
            state_key: update.state_key.clone(),
            action_key: update.action_key.clone(),
            selection: session.selection.clone(),
            crisis_override: session.crisis_override,
            peak_crisis_level: session.peak_crisis_level,
            observation_count: session.observations.len(),
            segment_count: session.segments.len(),
        };

        profile.record_outcome(outcome.clone(), exploration_rate);
        log_session_event(
            "session_ended",
            &outcome.session_id,
            json!({
                "reward": outcome.reward,
                "improvement": outcome.improvement,
                "exploration_rate": exploration_rate,
                "crisis_override": outcome.crisis_override,
            }),
        );

        self.active = None;
        Ok((outcome, update))
    }
}
