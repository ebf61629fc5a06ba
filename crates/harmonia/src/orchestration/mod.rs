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

pub mod consent;
pub mod coordinator;
pub mod event_system;
pub mod profile_store;
pub mod registry;

pub use consent::{ConsentGate, ConsentPurpose, StaticConsent};
pub use coordinator::{
    MonitorOutcome, MonitorReport, OrchestratorBuilder, OrchestratorPhase, SessionDecision,
    SessionInput, TherapyOrchestrator,
};
pub use event_system::{
    CrisisAuditHandler, EngineEvent, EventCategory, EventHandler, EventLevel, EventSubscriber,
    EventSystem, EventType, HandlerResult, LoggerEventHandler,
};
pub use profile_store::{FileProfileStore, InMemoryProfileStore, ProfileStore};
pub use registry::OrchestratorRegistry;
