//! Behaviour profile and its update rules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum subjects kept in `frequent_subjects`.
pub const MAX_FREQUENT_SUBJECTS: usize = 5;

/// Maximum topics kept in `recent_topics`.
pub const MAX_RECENT_TOPICS: usize = 10;

/// A quiz score must exceed this to update the preferred difficulty.
pub const HIGH_SCORE_THRESHOLD: f64 = 70.0;

/// Quiz difficulty. Levels outside the usual three are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    #[serde(untagged)]
    Other(String),
}

impl Difficulty {
    pub fn as_str(&self) -> &str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Other(level) => level,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked user action and its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BehaviorAction {
    SubjectView { subject_id: String },
    TopicView { topic_id: String },
    QuizComplete { score: f64, difficulty: Difficulty },
}

impl BehaviorAction {
    pub fn name(&self) -> &'static str {
        match self {
            BehaviorAction::SubjectView { .. } => "subject_view",
            BehaviorAction::TopicView { .. } => "topic_view",
            BehaviorAction::QuizComplete { .. } => "quiz_complete",
        }
    }
}

/// Per-user navigation history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BehaviorProfile {
    /// Distinct subjects in first-viewed order, oldest first.
    pub frequent_subjects: Vec<String>,

    /// Distinct topics, most recent first.
    pub recent_topics: Vec<String>,

    /// Difficulty of the last quiz scored above the threshold.
    pub preferred_difficulty: Option<Difficulty>,
}

impl BehaviorProfile {
    /// Apply one action. Returns whether the profile changed.
    pub fn apply(&mut self, action: &BehaviorAction) -> bool {
        match action {
            BehaviorAction::SubjectView { subject_id } => {
                if self.frequent_subjects.contains(subject_id) {
                    return false;
                }
                self.frequent_subjects.push(subject_id.clone());
                if self.frequent_subjects.len() > MAX_FREQUENT_SUBJECTS {
                    let excess = self.frequent_subjects.len() - MAX_FREQUENT_SUBJECTS;
                    self.frequent_subjects.drain(..excess);
                }
                true
            }
            BehaviorAction::TopicView { topic_id } => {
                if self.recent_topics.contains(topic_id) {
                    return false;
                }
                self.recent_topics.insert(0, topic_id.clone());
                self.recent_topics.truncate(MAX_RECENT_TOPICS);
                true
            }
            BehaviorAction::QuizComplete { score, difficulty } => {
                // NaN never counts as a high score.
                if score.is_nan() || *score <= HIGH_SCORE_THRESHOLD {
                    return false;
                }
                if self.preferred_difficulty.as_ref() == Some(difficulty) {
                    return false;
                }
                self.preferred_difficulty = Some(difficulty.clone());
                true
            }
        }
    }

    /// Up to `n` subjects, most recently added first.
    pub fn top_subjects(&self, n: usize) -> impl Iterator<Item = &str> {
        self.frequent_subjects.iter().rev().take(n).map(String::as_str)
    }

    /// Up to `n` topics, most recent first.
    pub fn latest_topics(&self, n: usize) -> impl Iterator<Item = &str> {
        self.recent_topics.iter().take(n).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.frequent_subjects.is_empty()
            && self.recent_topics.is_empty()
            && self.preferred_difficulty.is_none()
    }
}
