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
    default_resources, CrisisDetectionResult, CrisisEvent, CrisisLevel, CrisisResource,
    ReferralRecommendation, OVERRIDE_LEVEL,
};
use crate::config::CrisisConfig;
use crate::logging::log_crisis_event;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

const CRITICAL_KEYWORDS: &[&str] = &[
    "suicide",
    "suicidal",
    "kill myself",
    "end my life",
    "end it all",
    "want to die",
    "better off dead",
    "no reason to live",
    "take my own life",
];

const HIGH_KEYWORDS: &[&str] = &[
    "self harm",
    "self-harm",
    "hurt myself",
    "cutting myself",
    "can't go on",
    "cannot go on",
    "hopeless",
    "no way out",
    "give up on life",
];

const MEDIUM_KEYWORDS: &[&str] = &[
    "worthless",
    "can't cope",
    "cannot cope",
    "overwhelmed",
    "panic attack",
    "trapped",
    "unbearable",
    "falling apart",
];

const LOW_KEYWORDS: &[&str] = &[
    "stressed",
    "anxious",
    "sad",
    "lonely",
    "tired of everything",
    "down",
];

/// Most severe first. Scanning stops at the first list with a hit.
const SEVERITY_LISTS: [(CrisisLevel, &[&str]); 4] = [
    (CrisisLevel::Critical, CRITICAL_KEYWORDS),
    (CrisisLevel::High, HIGH_KEYWORDS),
    (CrisisLevel::Medium, MEDIUM_KEYWORDS),
    (CrisisLevel::Low, LOW_KEYWORDS),
];

#[derive(Debug, Clone)]
pub struct CrisisDetector {
    config: CrisisConfig,
    resources: Vec<CrisisResource>,
    audit: VecDeque<CrisisEvent>,
}

impl Default for CrisisDetector {
    fn default() -> Self {
        Self::new(CrisisConfig::default())
    }
}

impl CrisisDetector {
    pub fn new(config: CrisisConfig) -> Self {
        let capacity = config.audit_capacity;
        Self {
            config,
            resources: default_resources(),
            audit: VecDeque::with_capacity(capacity),
        }
    }

    pub fn with_resources(mut self, resources: Vec<CrisisResource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn config(&self) -> &CrisisConfig {
        &self.config
    }

    /// Case-insensitive substring scan. Never fails; no match is `NONE`.
    pub fn detect(&self, text: &str) -> CrisisDetectionResult {
        let search_text = text.to_lowercase();

        for (level, keywords) in SEVERITY_LISTS {
            let matched: Vec<String> = keywords
                .iter()
                .filter(|keyword| search_text.contains(*keyword))
                .map(|keyword| keyword.to_string())
                .collect();
            if matched.is_empty() {
                continue;
            }

            let resources = if level >= self.config.resource_threshold {
                self.resources.clone()
            } else {
                Vec::new()
            };
            return CrisisDetectionResult {
                level,
                confidence: level.confidence(),
                matched_keywords: matched,
                recommended_action: level.recommended_action().to_string(),
                resources,
            };
        }

        CrisisDetectionResult::none()
    }

    /// Detects and records MEDIUM-or-above results in the audit log.
    pub fn assess(&mut self, user_id: &str, text: &str, now: DateTime<Utc>) -> CrisisDetectionResult {
        let result = self.detect(text);
        log_crisis_event(user_id, &result);
        if result.level >= CrisisLevel::Medium {
            self.record(CrisisEvent {
                user_id: user_id.to_string(),
                level: result.level,
                matched_keywords: result.matched_keywords.clone(),
                timestamp: now,
            });
        }
        result
    }

    pub fn requires_override(&self, result: &CrisisDetectionResult) -> bool {
        result.level >= OVERRIDE_LEVEL
    }

    fn record(&mut self, event: CrisisEvent) {
        if self.audit.len() >= self.config.audit_capacity {
            self.audit.pop_front();
        }
        self.audit.push_back(event);
    }

    pub fn audit_log(&self) -> impl Iterator<Item = &CrisisEvent> {
        self.audit.iter()
    }

    pub fn referral(&self, user_id: &str, now: DateTime<Utc>) -> ReferralRecommendation {
        let window_start = now - Duration::days(self.config.referral_window_days);
        let recent = self
            .audit
            .iter()
            .filter(|event| event.user_id == user_id && event.timestamp >= window_start);

        let (mut high_severity_events, mut medium_events) = (0, 0);
        for event in recent {
            match event.level {
                CrisisLevel::High | CrisisLevel::Critical => high_severity_events += 1,
                CrisisLevel::Medium => medium_events += 1,
                _ => {}
            }
        }

        let days = self.config.referral_window_days;
        let (should_refer, reason) = if high_severity_events > 0 {
            (
                true,
                format!("{high_severity_events} high-severity crisis event(s) in the last {days} days"),
            )
        } else if medium_events >= self.config.referral_medium_threshold {
            (
                true,
                format!("{medium_events} medium-severity crisis events in the last {days} days"),
            )
        } else {
            (false, "No referral indicated".to_string())
        };

        ReferralRecommendation {
            should_refer,
            reason,
            high_severity_events,
            medium_events,
        }
    }
}
