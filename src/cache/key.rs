//! Structured cache keys and the patterns used to select them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::UserId;

/// Parameter name carried by every user-scoped key.
pub const USER_PARAM: &str = "userId";

/// Resource types of the learning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Subjects,
    Subject,
    Topics,
    Topic,
    Quizzes,
    Quiz,
    DailyChallenge,
    Leaderboard,
    UserProfile,
    UserStats,
    UserProgress,
    UserStreak,
    ActiveQuests,
    ActiveSessions,
    Achievements,
    Recommendations,
}

impl ResourceKind {
    /// Whether keys of this kind belong to one user.
    pub fn is_user_scoped(self) -> bool {
        matches!(
            self,
            ResourceKind::UserProfile
                | ResourceKind::UserStats
                | ResourceKind::UserProgress
                | ResourceKind::UserStreak
                | ResourceKind::ActiveQuests
                | ResourceKind::ActiveSessions
                | ResourceKind::Achievements
                | ResourceKind::Recommendations
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Subjects => "subjects",
            ResourceKind::Subject => "subject",
            ResourceKind::Topics => "topics",
            ResourceKind::Topic => "topic",
            ResourceKind::Quizzes => "quizzes",
            ResourceKind::Quiz => "quiz",
            ResourceKind::DailyChallenge => "daily_challenge",
            ResourceKind::Leaderboard => "leaderboard",
            ResourceKind::UserProfile => "user_profile",
            ResourceKind::UserStats => "user_stats",
            ResourceKind::UserProgress => "user_progress",
            ResourceKind::UserStreak => "user_streak",
            ResourceKind::ActiveQuests => "active_quests",
            ResourceKind::ActiveSessions => "active_sessions",
            ResourceKind::Achievements => "achievements",
            ResourceKind::Recommendations => "recommendations",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource type plus identifying parameters.
///
/// Parameters are kept sorted so that two keys built in a different order
/// compare and hash equal, which is what collapses repeated warm calls onto
/// one in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub params: BTreeMap<String, String>,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Key for a user-scoped resource.
    pub fn for_user(kind: ResourceKind, user: &UserId) -> Self {
        Self::new(kind).with(USER_PARAM, user.as_str())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Owner of a user-scoped key.
    pub fn user(&self) -> Option<&str> {
        self.param(USER_PARAM)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            write!(f, "[{}]", params.join(","))?;
        }
        Ok(())
    }
}

/// Selects a set of keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPattern {
    Exact(ResourceKey),
    Kind(ResourceKind),
    /// Keys of `kind` carrying at least these parameter values.
    KindWith {
        kind: ResourceKind,
        params: BTreeMap<String, String>,
    },
    /// Every user-scoped key of one user.
    User(UserId),
}

impl KeyPattern {
    pub fn matches(&self, key: &ResourceKey) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Kind(kind) => key.kind == *kind,
            KeyPattern::KindWith { kind, params } => {
                key.kind == *kind
                    && params
                        .iter()
                        .all(|(name, value)| key.param(name) == Some(value.as_str()))
            }
            KeyPattern::User(user) => {
                key.kind.is_user_scoped() && key.user() == Some(user.as_str())
            }
        }
    }
}

impl From<ResourceKey> for KeyPattern {
    fn from(key: ResourceKey) -> Self {
        KeyPattern::Exact(key)
    }
}

impl From<ResourceKind> for KeyPattern {
    fn from(kind: ResourceKind) -> Self {
        KeyPattern::Kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_order_does_not_matter() {
        let a = ResourceKey::new(ResourceKind::Quizzes)
            .with("topicId", "7")
            .with("difficulty", "hard");
        let b = ResourceKey::new(ResourceKind::Quizzes)
            .with("difficulty", "hard")
            .with("topicId", "7");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "quizzes[difficulty=hard,topicId=7]");
    }

    #[test]
    fn test_patterns() {
        let alice = UserId::new("alice");
        let stats = ResourceKey::for_user(ResourceKind::UserStats, &alice);
        let topic = ResourceKey::new(ResourceKind::Topic).with("topicId", "3");

        assert!(KeyPattern::User(alice.clone()).matches(&stats));
        assert!(!KeyPattern::User(UserId::new("bob")).matches(&stats));
        assert!(!KeyPattern::User(alice).matches(&topic));

        assert!(KeyPattern::Kind(ResourceKind::Topic).matches(&topic));
        let with = KeyPattern::KindWith {
            kind: ResourceKind::Topic,
            params: BTreeMap::from([("topicId".to_string(), "3".to_string())]),
        };
        assert!(with.matches(&topic));
        assert!(!with.matches(&ResourceKey::new(ResourceKind::Topic).with("topicId", "4")));
    }
}
