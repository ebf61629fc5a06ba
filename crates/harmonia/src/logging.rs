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

use crate::emotion::{EmotionScore, FusionWeights};
use crate::safety::{CrisisDetectionResult, CrisisLevel};
use serde_json::Value;
use tracing::{debug, error, info, warn};

pub fn log_fusion_event(user_id: &str, fused: &EmotionScore, weights: &FusionWeights) {
    debug!(
        user_id = user_id,
        emotion = %fused.label,
        confidence = fused.confidence,
        face = weights.face,
        voice = weights.voice,
        text = weights.text,
        heart_rate = weights.heart_rate,
        "Emotion fused"
    );
}

pub fn log_policy_update(state_key: &str, action_key: &str, previous: f64, updated: f64) {
    debug!(
        state = state_key,
        action = action_key,
        previous = previous,
        updated = updated,
        "Q-value updated"
    );
}

pub fn log_crisis_event(user_id: &str, result: &CrisisDetectionResult) {
    match result.level {
        CrisisLevel::None => {}
        CrisisLevel::Low => debug!(
            user_id = user_id,
            level = %result.level,
            "Low severity distress signal"
        ),
        CrisisLevel::Medium => warn!(
            user_id = user_id,
            level = %result.level,
            keywords = ?result.matched_keywords,
            "Crisis signal detected"
        ),
        CrisisLevel::High | CrisisLevel::Critical => error!(
            user_id = user_id,
            level = %result.level,
            confidence = result.confidence,
            keywords = ?result.matched_keywords,
            "Severe crisis signal detected"
        ),
    }
}

pub fn log_session_event(event: &str, session_id: &str, payload: Value) {
    info!(
        event = event,
        session_id = session_id,
        payload = %serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string()),
        "Session event"
    );
}

/// A recoverable failure the session continues through.
pub fn log_degraded(user_id: &str, error: &dyn std::error::Error) {
    warn!(
        user_id = user_id,
        error = %error,
        "Continuing without a failed input"
    );
}

pub fn log_error(context: &str, error: &dyn std::error::Error) {
    error!(
        context = context,
        error = %error,
        "Engine error"
    );
}
