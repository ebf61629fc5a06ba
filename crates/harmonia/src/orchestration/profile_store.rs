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

use crate::error::{EngineError, EngineResult};
use crate::profile::UserProfile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::sync::RwLock;

/// Whole-profile read/replace persistence.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_profile(&self, user_id: &str) -> EngineResult<Option<UserProfile>>;
    async fn save_profile(&self, profile: &UserProfile) -> EngineResult<()>;
    async fn delete_profile(&self, user_id: &str) -> EngineResult<()>;
    async fn list_users(&self) -> EngineResult<Vec<String>>;
}

/// One pretty-printed JSON document per user.
pub struct FileProfileStore {
    profile_dir: PathBuf,
}

impl FileProfileStore {
    pub async fn new(profile_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let profile_dir = profile_dir.as_ref().to_path_buf();
        fs::create_dir_all(&profile_dir).await.map_err(|e| {
            EngineError::Persistence(format!(
                "Failed to create profile directory {}: {e}",
                profile_dir.display()
            ))
        })?;
        Ok(Self { profile_dir })
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    fn profile_path(&self, user_id: &str) -> EngineResult<PathBuf> {
        let valid = !user_id.is_empty()
            && user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !user_id.starts_with('.');
        if !valid {
            return Err(EngineError::InvalidInput(format!(
                "User id {user_id:?} cannot be used as a profile file name"
            )));
        }
        Ok(self.profile_dir.join(format!("{user_id}.json")))
    }
}

#[async_trait::async_trait]
impl ProfileStore for FileProfileStore {
    async fn load_profile(&self, user_id: &str) -> EngineResult<Option<UserProfile>> {
        let path = self.profile_path(user_id)?;
        let profile_json = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngineError::Persistence(format!(
                    "Failed to read profile file: {e}"
                )))
            }
        };

        let profile: UserProfile = serde_json::from_str(&profile_json).map_err(|e| {
            EngineError::Persistence(format!("Failed to deserialise profile {user_id}: {e}"))
        })?;
        Ok(Some(profile))
    }

    async fn save_profile(&self, profile: &UserProfile) -> EngineResult<()> {
        let path = self.profile_path(&profile.user_id)?;
        let temp_path = path.with_extension("json.tmp");
        let profile_json = serde_json::to_string_pretty(profile)?;

        fs::write(&temp_path, profile_json).await.map_err(|e| {
            EngineError::Persistence(format!("Failed to write profile file: {e}"))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            EngineError::Persistence(format!("Failed to replace profile file: {e}"))
        })?;
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> EngineResult<()> {
        let path = self.profile_path(user_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Persistence(format!(
                "Failed to remove profile file: {e}"
            ))),
        }
    }

    async fn list_users(&self) -> EngineResult<Vec<String>> {
        let mut entries = fs::read_dir(&self.profile_dir).await.map_err(|e| {
            EngineError::Persistence(format!("Failed to read profile directory: {e}"))
        })?;

        let mut users = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            EngineError::Persistence(format!("Failed to read directory entry: {e}"))
        })? {
            if let Some(file_name) = entry.file_name().to_str() {
                if let Some(user_id) = file_name.strip_suffix(".json") {
                    users.push(user_id.to_string());
                }
            }
        }
        users.sort();
        Ok(users)
    }
}

/// Process-local store. `set_fail_writes` makes saves fail until cleared.
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    fail_writes: AtomicBool,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load_profile(&self, user_id: &str) -> EngineResult<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn save_profile(&self, profile: &UserProfile) -> EngineResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::Persistence(format!(
                "Profile store rejected write for {}",
                profile.user_id
            )));
        }
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> EngineResult<()> {
        self.profiles.write().await.remove(user_id);
        Ok(())
    }

    async fn list_users(&self) -> EngineResult<Vec<String>> {
        let mut users: Vec<String> = self.profiles.read().await.keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path().join("profiles")).await.unwrap();

        assert!(store.load_profile("alice").await.unwrap().is_none());

        let mut profile = UserProfile::new("alice", 0.3, Utc::now());
        profile.q_table.set("sad_-5_2_evening", "neutral_7_slow", 0.12);
        store.save_profile(&profile).await.unwrap();
        store.save_profile(&profile).await.unwrap();

        let loaded = store.load_profile("alice").await.unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(store.list_users().await.unwrap(), vec!["alice".to_string()]);

        store.delete_profile("alice").await.unwrap();
        store.delete_profile("alice").await.unwrap();
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path()).await.unwrap();
        let result = store.load_profile("../etc/passwd").await;
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_corrupt_profile_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("bob.json"), "{not json").unwrap();
        let result = store.load_profile("bob").await;
        assert!(matches!(result, Err(EngineError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_in_memory_failure_injection() {
        let store = InMemoryProfileStore::new();
        let profile = UserProfile::new("carol", 0.3, Utc::now());

        store.set_fail_writes(true);
        assert!(matches!(
            store.save_profile(&profile).await,
            Err(EngineError::Persistence(_))
        ));
        assert!(store.is_empty().await);

        store.set_fail_writes(false);
        store.save_profile(&profile).await.unwrap();
        assert_eq!(store.load_profile("carol").await.unwrap(), Some(profile));
    }
}
