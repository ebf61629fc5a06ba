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

use crate::emotion::Modality;
use crate::safety::CrisisLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Consent required from user {user_id} for {purpose}")]
    ConsentRequired { user_id: String, purpose: String },
    #[error("Illegal state: {0}")]
    IllegalState(String),
    #[error("Modality {modality} unavailable: {reason}")]
    ModalityUnavailable { modality: Modality, reason: String },
    #[error("Persistence failure: {0}")]
    Persistence(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialisation error: {0}")]
    Serialisation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Serialisation(format!("JSON serialisation error: {error}"))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(error: toml::de::Error) -> Self {
        EngineError::Configuration(format!("TOML parse error: {error}"))
    }
}

/// Where a failure should send the caller at the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureRoute {
    CollectConsent,
    TryAgain,
    DiscloseResources,
}

impl EngineError {
    pub fn route(&self) -> FailureRoute {
        match self {
            EngineError::ConsentRequired { .. } => FailureRoute::CollectConsent,
            _ => FailureRoute::TryAgain,
        }
    }

    /// A HIGH or CRITICAL crisis observed in the same step always wins.
    pub fn route_with_crisis(&self, crisis: Option<CrisisLevel>) -> FailureRoute {
        match crisis {
            Some(level) if level >= CrisisLevel::High => FailureRoute::DiscloseResources,
            _ => self.route(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::IllegalState(_))
    }
}
