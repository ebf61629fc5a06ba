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

pub mod detector;

pub use detector::CrisisDetector;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Level at and above which the calming override replaces the policy's
/// choice. Fixed; never read from configuration.
pub const OVERRIDE_LEVEL: CrisisLevel = CrisisLevel::High;

/// Severity of a distress signal. Ordering follows severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl CrisisLevel {
    /// Fixed per-level confidence; not a learned score.
    pub fn confidence(self) -> f64 {
        match self {
            CrisisLevel::None => 0.0,
            CrisisLevel::Low => 0.60,
            CrisisLevel::Medium => 0.70,
            CrisisLevel::High => 0.85,
            CrisisLevel::Critical => 0.95,
        }
    }

    pub fn recommended_action(self) -> &'static str {
        match self {
            CrisisLevel::None => "Continue the session as planned.",
            CrisisLevel::Low => "Check in gently and keep monitoring.",
            CrisisLevel::Medium => {
                "Offer support resources and suggest talking to someone you trust."
            }
            CrisisLevel::High => {
                "Pause the session and reach out to a crisis line or a mental health professional now."
            }
            CrisisLevel::Critical => {
                "Contact emergency services or a crisis line immediately. You do not have to go through this alone."
            }
        }
    }
}

impl fmt::Display for CrisisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrisisLevel::None => "NONE",
            CrisisLevel::Low => "LOW",
            CrisisLevel::Medium => "MEDIUM",
            CrisisLevel::High => "HIGH",
            CrisisLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisResource {
    pub name: String,
    pub contact: String,
    pub description: String,
    pub available_24h: bool,
}

impl CrisisResource {
    fn new(name: &str, contact: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            contact: contact.to_string(),
            description: description.to_string(),
            available_24h: true,
        }
    }
}

pub fn default_resources() -> Vec<CrisisResource> {
    vec![
        CrisisResource::new(
            "988 Suicide & Crisis Lifeline",
            "988",
            "Free, confidential support by call or text",
        ),
        CrisisResource::new(
            "Crisis Text Line",
            "Text HOME to 741741",
            "Text with a trained crisis counselor",
        ),
        CrisisResource::new(
            "Emergency Services",
            "911",
            "For immediate danger to yourself or others",
        ),
        CrisisResource::new(
            "SAMHSA National Helpline",
            "1-800-662-4357",
            "Treatment referral and information service",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisDetectionResult {
    pub level: CrisisLevel,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub recommended_action: String,
    pub resources: Vec<CrisisResource>,
}

impl CrisisDetectionResult {
    pub fn none() -> Self {
        Self {
            level: CrisisLevel::None,
            confidence: CrisisLevel::None.confidence(),
            matched_keywords: Vec::new(),
            recommended_action: CrisisLevel::None.recommended_action().to_string(),
            resources: Vec::new(),
        }
    }

    pub fn is_crisis(&self) -> bool {
        self.level > CrisisLevel::None
    }
}

/// One audited MEDIUM-or-above detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisEvent {
    pub user_id: String,
    pub level: CrisisLevel,
    pub matched_keywords: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRecommendation {
    pub should_refer: bool,
    pub reason: String,
    pub high_severity_events: usize,
    pub medium_events: usize,
}
