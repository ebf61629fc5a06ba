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

use super::{ConsentGate, ProfileStore, TherapyOrchestrator};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// One orchestrator per user, each behind its own lock. Users never share
/// a profile or Q-table.
pub struct OrchestratorRegistry {
    config: EngineConfig,
    consent: Arc<dyn ConsentGate>,
    store: Arc<dyn ProfileStore>,
    orchestrators: RwLock<HashMap<String, Arc<Mutex<TherapyOrchestrator>>>>,
}

impl OrchestratorRegistry {
    pub fn new(
        config: EngineConfig,
        consent: Arc<dyn ConsentGate>,
        store: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            config,
            consent,
            store,
            orchestrators: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the user's orchestrator, building and initialising it on
    /// first use. Initialisation runs outside the map lock, so other users
    /// are not held up by a slow profile load; if two callers race for the
    /// same new user, the first insert wins and the other build is dropped.
    pub async fn get_or_create(&self, user_id: &str) -> EngineResult<Arc<Mutex<TherapyOrchestrator>>> {
        if let Some(existing) = self.orchestrators.read().await.get(user_id) {
            return Ok(existing.clone());
        }

        let mut orchestrator = TherapyOrchestrator::builder(user_id)
            .config(self.config.clone())
            .consent(self.consent.clone())
            .store(self.store.clone())
            .build()
            .await?;
        orchestrator.initialize().await?;

        let mut orchestrators = self.orchestrators.write().await;
        let handle = orchestrators
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(orchestrator)));
        Ok(handle.clone())
    }

    pub async fn remove(&self, user_id: &str) -> Option<Arc<Mutex<TherapyOrchestrator>>> {
        self.orchestrators.write().await.remove(user_id)
    }

    pub async fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.orchestrators.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    pub async fn len(&self) -> usize {
        self.orchestrators.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orchestrators.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{InMemoryProfileStore, SessionInput, StaticConsent};
    use crate::profile::UserProfile;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Holds the first load of `slow` until released.
    struct GatedStore {
        inner: InMemoryProfileStore,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl ProfileStore for GatedStore {
        async fn load_profile(&self, user_id: &str) -> EngineResult<Option<UserProfile>> {
            if user_id == "slow" {
                self.release.notified().await;
            }
            self.inner.load_profile(user_id).await
        }

        async fn save_profile(&self, profile: &UserProfile) -> EngineResult<()> {
            self.inner.save_profile(profile).await
        }

        async fn delete_profile(&self, user_id: &str) -> EngineResult<()> {
            self.inner.delete_profile(user_id).await
        }

        async fn list_users(&self) -> EngineResult<Vec<String>> {
            self.inner.list_users().await
        }
    }

    fn registry() -> OrchestratorRegistry {
        let mut config = EngineConfig::default();
        config.learning.seed = Some(3);
        OrchestratorRegistry::new(
            config,
            Arc::new(StaticConsent::granted().grant_all("alice").grant_all("bob")),
            Arc::new(InMemoryProfileStore::new()),
        )
    }

    #[tokio::test]
    async fn test_same_user_shares_one_orchestrator() {
        let registry = registry();
        let first = registry.get_or_create("alice").await.unwrap();
        let second = registry.get_or_create("alice").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_users_learn_independently() {
        let registry = registry();
        let alice = registry.get_or_create("alice").await.unwrap();
        let bob = registry.get_or_create("bob").await.unwrap();

        {
            let mut alice = alice.lock().await;
            alice.start(SessionInput::text("I feel sad")).await.unwrap();
            alice.end(None).await.unwrap();
        }

        let alice_updates = alice.lock().await.profile().unwrap().total_updates;
        let bob_profile = bob.lock().await.profile().cloned().unwrap();
        assert_eq!(alice_updates, 1);
        assert_eq!(bob_profile.total_updates, 0);
        assert!(bob_profile.q_table.is_empty());
        assert_eq!(registry.users().await, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[tokio::test]
    async fn test_slow_initialisation_does_not_block_other_users() {
        let store = Arc::new(GatedStore {
            inner: InMemoryProfileStore::new(),
            release: Notify::new(),
        });
        let registry = Arc::new(OrchestratorRegistry::new(
            EngineConfig::default(),
            Arc::new(StaticConsent::AllowAll),
            store.clone(),
        ));

        let pending = tokio::spawn({
            let registry = registry.clone();
            async move { registry.get_or_create("slow").await.map(|_| ()) }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let alice = tokio::time::timeout(Duration::from_secs(1), registry.get_or_create("alice")).await;
        assert!(alice.is_ok_and(|result| result.is_ok()));
        assert_eq!(registry.users().await, vec!["alice".to_string()]);

        store.release.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_consent_failure_is_not_registered() {
        let registry = registry();
        assert!(registry.get_or_create("mallory").await.is_err());
        assert!(registry.is_empty().await);
    }
}
