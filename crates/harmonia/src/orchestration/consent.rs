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

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentPurpose {
    EmotionAnalysis,
    AdaptivePersonalisation,
}

impl ConsentPurpose {
    /// Everything the engine needs before a session may start.
    pub const REQUIRED: [ConsentPurpose; 2] = [
        ConsentPurpose::EmotionAnalysis,
        ConsentPurpose::AdaptivePersonalisation,
    ];
}

impl fmt::Display for ConsentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsentPurpose::EmotionAnalysis => f.write_str("emotion_analysis"),
            ConsentPurpose::AdaptivePersonalisation => f.write_str("adaptive_personalisation"),
        }
    }
}

/// Answers whether a user agreed to a given use of their data.
#[async_trait::async_trait]
pub trait ConsentGate: Send + Sync {
    async fn has_consent(&self, user_id: &str, purpose: ConsentPurpose) -> bool;
}

#[derive(Debug, Clone)]
pub enum StaticConsent {
    AllowAll,
    DenyAll,
    Granted(HashSet<(String, ConsentPurpose)>),
}

impl StaticConsent {
    pub fn granted() -> Self {
        StaticConsent::Granted(HashSet::new())
    }

    pub fn grant(mut self, user_id: impl Into<String>, purpose: ConsentPurpose) -> Self {
        if let StaticConsent::Granted(grants) = &mut self {
            grants.insert((user_id.into(), purpose));
        }
        self
    }

    pub fn grant_all(self, user_id: &str) -> Self {
        ConsentPurpose::REQUIRED
            .into_iter()
            .fold(self, |consent, purpose| consent.grant(user_id, purpose))
    }
}

#[async_trait::async_trait]
impl ConsentGate for StaticConsent {
    async fn has_consent(&self, user_id: &str, purpose: ConsentPurpose) -> bool {
        match self {
            StaticConsent::AllowAll => true,
            StaticConsent::DenyAll => false,
            StaticConsent::Granted(grants) => grants.contains(&(user_id.to_string(), purpose)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_per_user_grants() {
        let consent = StaticConsent::granted()
            .grant_all("u1")
            .grant("u2", ConsentPurpose::EmotionAnalysis);

        assert!(consent.has_consent("u1", ConsentPurpose::AdaptivePersonalisation).await);
        assert!(consent.has_consent("u2", ConsentPurpose::EmotionAnalysis).await);
        assert!(!consent.has_consent("u2", ConsentPurpose::AdaptivePersonalisation).await);
        assert!(!consent.has_consent("u3", ConsentPurpose::EmotionAnalysis).await);
    }

    #[tokio::test]
    async fn test_blanket_policies() {
        assert!(StaticConsent::AllowAll.has_consent("x", ConsentPurpose::EmotionAnalysis).await);
        assert!(!StaticConsent::DenyAll.has_consent("x", ConsentPurpose::EmotionAnalysis).await);
    }
}
