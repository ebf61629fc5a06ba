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

use crate::emotion::EmotionScore;
use crate::error::EngineError;
use crate::music::MusicSelection;
use crate::policy::QUpdate;
use crate::safety::CrisisLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1000;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Fans engine events out to a broadcast channel and to registered
/// handlers. Delivery problems are logged and never fail the caller.
pub struct EventSystem {
    subscribers: Arc<RwLock<HashMap<EventType, Vec<EventSubscriber>>>>,
    event_sender: broadcast::Sender<EngineEvent>,
    _event_receiver: broadcast::Receiver<EngineEvent>,
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSystem {
    pub fn new() -> Self {
        let (event_sender, event_receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            event_sender,
            _event_receiver: event_receiver,
        }
    }

    pub async fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.event_sender.send(event.clone()) {
            warn!(error = %e, "Failed to broadcast engine event");
        }

        let subscribers = self.subscribers.read().await;
        for key in [event.event_type(), EventType::All] {
            let Some(event_subscribers) = subscribers.get(&key) else {
                continue;
            };
            for subscriber in event_subscribers {
                if let Err(e) = subscriber.notify(&event).await {
                    warn!(
                        subscriber = %subscriber.id,
                        error = %e,
                        "Failed to notify event subscriber"
                    );
                }
            }
        }
    }

    pub async fn subscribe(&self, event_type: EventType, subscriber: EventSubscriber) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.entry(event_type).or_default().push(subscriber);
    }

    pub fn get_event_receiver(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_sender.subscribe()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Lifecycle,
    Emotion,
    Safety,
    Learning,
    Storage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    OrchestratorInitialised {
        user_id: String,
        new_profile: bool,
        timestamp: DateTime<Utc>,
    },
    SessionStarted {
        user_id: String,
        session_id: String,
        emotion: EmotionScore,
        selection: MusicSelection,
        timestamp: DateTime<Utc>,
    },
    EmotionRecorded {
        user_id: String,
        session_id: String,
        emotion: EmotionScore,
        valence: f64,
        timestamp: DateTime<Utc>,
    },
    /// Carries `EngineError::ModalityUnavailable`; the session continues
    /// without that modality.
    ModalityUnavailable {
        user_id: String,
        error: EngineError,
        timestamp: DateTime<Utc>,
    },
    CrisisDetected {
        user_id: String,
        session_id: Option<String>,
        level: CrisisLevel,
        matched_keywords: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    CrisisOverrideApplied {
        user_id: String,
        session_id: String,
        level: CrisisLevel,
        timestamp: DateTime<Utc>,
    },
    MonitorSkipped {
        user_id: String,
        session_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    PolicyUpdated {
        user_id: String,
        update: QUpdate,
        exploration_rate: f64,
        timestamp: DateTime<Utc>,
    },
    SessionEnded {
        user_id: String,
        session_id: String,
        reward: f64,
        improvement: f64,
        timestamp: DateTime<Utc>,
    },
    ProfilePersisted {
        user_id: String,
        timestamp: DateTime<Utc>,
    },
    ErrorOccurred {
        user_id: String,
        error: EngineError,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            EngineEvent::OrchestratorInitialised { .. } => EventType::OrchestratorInitialised,
            EngineEvent::SessionStarted { .. } => EventType::SessionStarted,
            EngineEvent::EmotionRecorded { .. } => EventType::EmotionRecorded,
            EngineEvent::ModalityUnavailable { .. } => EventType::ModalityUnavailable,
            EngineEvent::CrisisDetected { .. } => EventType::CrisisDetected,
            EngineEvent::CrisisOverrideApplied { .. } => EventType::CrisisOverrideApplied,
            EngineEvent::MonitorSkipped { .. } => EventType::MonitorSkipped,
            EngineEvent::PolicyUpdated { .. } => EventType::PolicyUpdated,
            EngineEvent::SessionEnded { .. } => EventType::SessionEnded,
            EngineEvent::ProfilePersisted { .. } => EventType::ProfilePersisted,
            EngineEvent::ErrorOccurred { .. } => EventType::ErrorOccurred,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            EngineEvent::OrchestratorInitialised { user_id, .. }
            | EngineEvent::SessionStarted { user_id, .. }
            | EngineEvent::EmotionRecorded { user_id, .. }
            | EngineEvent::ModalityUnavailable { user_id, .. }
            | EngineEvent::CrisisDetected { user_id, .. }
            | EngineEvent::CrisisOverrideApplied { user_id, .. }
            | EngineEvent::MonitorSkipped { user_id, .. }
            | EngineEvent::PolicyUpdated { user_id, .. }
            | EngineEvent::SessionEnded { user_id, .. }
            | EngineEvent::ProfilePersisted { user_id, .. }
            | EngineEvent::ErrorOccurred { user_id, .. } => user_id,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            EngineEvent::SessionStarted { session_id, .. }
            | EngineEvent::EmotionRecorded { session_id, .. }
            | EngineEvent::CrisisOverrideApplied { session_id, .. }
            | EngineEvent::MonitorSkipped { session_id, .. }
            | EngineEvent::SessionEnded { session_id, .. } => Some(session_id),
            EngineEvent::CrisisDetected { session_id, .. } => session_id.as_deref(),
            _ => None,
        }
    }

    pub fn level(&self) -> EventLevel {
        match self {
            EngineEvent::EmotionRecorded { .. } | EngineEvent::PolicyUpdated { .. } => {
                EventLevel::Debug
            }
            EngineEvent::ModalityUnavailable { .. } | EngineEvent::MonitorSkipped { .. } => {
                EventLevel::Warn
            }
            EngineEvent::CrisisDetected { level, .. } => match level {
                CrisisLevel::None | CrisisLevel::Low => EventLevel::Info,
                CrisisLevel::Medium => EventLevel::Warn,
                CrisisLevel::High | CrisisLevel::Critical => EventLevel::Critical,
            },
            EngineEvent::CrisisOverrideApplied { .. } => EventLevel::Critical,
            EngineEvent::ErrorOccurred { .. } => EventLevel::Error,
            _ => EventLevel::Info,
        }
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EngineEvent::OrchestratorInitialised { .. }
            | EngineEvent::SessionStarted { .. }
            | EngineEvent::MonitorSkipped { .. }
            | EngineEvent::SessionEnded { .. }
            | EngineEvent::ErrorOccurred { .. } => EventCategory::Lifecycle,
            EngineEvent::EmotionRecorded { .. } | EngineEvent::ModalityUnavailable { .. } => {
                EventCategory::Emotion
            }
            EngineEvent::CrisisDetected { .. } | EngineEvent::CrisisOverrideApplied { .. } => {
                EventCategory::Safety
            }
            EngineEvent::PolicyUpdated { .. } => EventCategory::Learning,
            EngineEvent::ProfilePersisted { .. } => EventCategory::Storage,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    OrchestratorInitialised,
    SessionStarted,
    EmotionRecorded,
    ModalityUnavailable,
    CrisisDetected,
    CrisisOverrideApplied,
    MonitorSkipped,
    PolicyUpdated,
    SessionEnded,
    ProfilePersisted,
    ErrorOccurred,
    All,
}

pub struct EventSubscriber {
    pub id: String,
    pub handler: Arc<dyn EventHandler>,
}

impl EventSubscriber {
    pub fn new(id: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }

    pub async fn notify(&self, event: &EngineEvent) -> HandlerResult {
        self.handler.handle_event(event).await
    }
}

#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &EngineEvent) -> HandlerResult;
}

/// Forwards every event to `tracing` at the event's level.
pub struct LoggerEventHandler;

#[async_trait::async_trait]
impl EventHandler for LoggerEventHandler {
    async fn handle_event(&self, event: &EngineEvent) -> HandlerResult {
        let user_id = event.user_id();
        let category = event.category();
        match event.level() {
            EventLevel::Debug => debug!(user_id, ?category, "Event: {event:?}"),
            EventLevel::Info => info!(user_id, ?category, "Event: {event:?}"),
            EventLevel::Warn => warn!(user_id, ?category, "Event: {event:?}"),
            EventLevel::Error | EventLevel::Critical => {
                error!(user_id, ?category, "Event: {event:?}")
            }
        }
        Ok(())
    }
}

const DEFAULT_AUDIT_CAPACITY: usize = 100;

/// Keeps the most recent MEDIUM-or-above crisis detections for later
/// safety review. The oldest entry is dropped once `capacity` is reached.
pub struct CrisisAuditHandler {
    events: Arc<RwLock<VecDeque<EngineEvent>>>,
    capacity: usize,
}

impl Default for CrisisAuditHandler {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl CrisisAuditHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn get_events(&self) -> Vec<EngineEvent> {
        self.events.read().await.iter().cloned().collect()
    }
}

#[async_trait::async_trait]
impl EventHandler for CrisisAuditHandler {
    async fn handle_event(&self, event: &EngineEvent) -> HandlerResult {
        if let EngineEvent::CrisisDetected { level, .. } = event {
            if *level >= CrisisLevel::Medium {
                let mut events = self.events.write().await;
                if events.len() >= self.capacity {
                    events.pop_front();
                }
                events.push_back(event.clone());
            }
        }
        Ok(())
    }
}
