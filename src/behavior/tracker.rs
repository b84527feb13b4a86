//! Best-effort behaviour tracking.
//!
//! Tracking annotates a user action; it must never fail or block it. Read
//! failures and corrupt content yield an empty profile, write failures are
//! logged and dropped.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::behavior::profile::{BehaviorAction, BehaviorProfile};
use crate::behavior::storage::DurableStorage;
use crate::identity::UserId;

pub struct BehaviorTracker {
    storage: Arc<dyn DurableStorage>,
    namespace: String,
    /// Serializes read-modify-write so concurrent records never lose an update.
    write_lock: Mutex<()>,
}

impl BehaviorTracker {
    pub fn new(storage: Arc<dyn DurableStorage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn namespace_for(&self, user: &UserId) -> String {
        format!("{}:{}", self.namespace, user)
    }

    /// Load a user's profile. Never fails.
    pub async fn load(&self, user: &UserId) -> BehaviorProfile {
        let namespace = self.namespace_for(user);
        match self.storage.read(&namespace).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(%user, error = %err, "Corrupt behaviour profile, starting empty");
                BehaviorProfile::default()
            }),
            Ok(None) => BehaviorProfile::default(),
            Err(err) => {
                warn!(%user, error = %err, "Failed to read behaviour profile");
                BehaviorProfile::default()
            }
        }
    }

    /// Record an action and return the updated profile. Never fails.
    pub async fn record(&self, user: &UserId, action: &BehaviorAction) -> BehaviorProfile {
        let _guard = self.write_lock.lock().await;

        let mut profile = self.load(user).await;
        if !profile.apply(action) {
            debug!(%user, action = action.name(), "Behaviour unchanged");
            return profile;
        }

        match serde_json::to_string(&profile) {
            Ok(raw) => {
                if let Err(err) = self.storage.write(&self.namespace_for(user), &raw).await {
                    warn!(%user, action = action.name(), error = %err, "Failed to persist behaviour profile");
                }
            }
            Err(err) => {
                warn!(%user, error = %err, "Failed to encode behaviour profile");
            }
        }
        debug!(%user, action = action.name(), "Behaviour recorded");
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::profile::Difficulty;
    use crate::behavior::storage::MemoryStorage;
    use crate::error::StorageError;
    use async_trait::async_trait;

    struct BrokenStorage;

    #[async_trait]
    impl DurableStorage for BrokenStorage {
        async fn read(&self, _namespace: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }

        async fn write(&self, _namespace: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
    }

    #[tokio::test]
    async fn test_record_persists_per_user() {
        let storage = Arc::new(MemoryStorage::new());
        let tracker = BehaviorTracker::new(storage.clone(), "user-behavior");
        let alice = UserId::new("alice");

        tracker
            .record(
                &alice,
                &BehaviorAction::SubjectView {
                    subject_id: "math".into(),
                },
            )
            .await;

        let raw = storage.read("user-behavior:alice").await.unwrap().unwrap();
        assert!(raw.contains("math"));
        assert!(tracker.load(&UserId::new("bob")).await.is_empty());

        // A fresh tracker over the same storage sees the saved profile.
        let reloaded = BehaviorTracker::new(storage, "user-behavior");
        assert_eq!(reloaded.load(&alice).await.frequent_subjects, vec!["math"]);
    }

    #[tokio::test]
    async fn test_broken_storage_never_fails_caller() {
        let tracker = BehaviorTracker::new(Arc::new(BrokenStorage), "user-behavior");
        let user = UserId::new("carol");

        let profile = tracker
            .record(
                &user,
                &BehaviorAction::QuizComplete {
                    score: 95.0,
                    difficulty: Difficulty::Hard,
                },
            )
            .await;
        assert_eq!(profile.preferred_difficulty, Some(Difficulty::Hard));
        assert!(tracker.load(&user).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_profile_reads_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("user-behavior:dave", "{not json").await.unwrap();
        let tracker = BehaviorTracker::new(storage, "user-behavior");

        assert!(tracker.load(&UserId::new("dave")).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_records_keep_every_update() {
        let tracker = Arc::new(BehaviorTracker::new(
            Arc::new(MemoryStorage::new()),
            "user-behavior",
        ));
        let user = UserId::new("erin");

        let mut tasks = Vec::new();
        for i in 0..5 {
            let tracker = tracker.clone();
            let user = user.clone();
            tasks.push(tokio::spawn(async move {
                tracker
                    .record(
                        &user,
                        &BehaviorAction::TopicView {
                            topic_id: format!("t{i}"),
                        },
                    )
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(tracker.load(&user).await.recent_topics.len(), 5);
    }
}
