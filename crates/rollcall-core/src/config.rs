//! Tunable thresholds for matching, learning and confirmation.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Voting thresholds used by [`VotingMatcher`](crate::matcher::VotingMatcher).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// A reference sample "votes" for its identity when it scores above this.
    pub match_confidence: f32,
    /// Votes an identity needs before it can be recognized.
    pub min_required_matches: usize,
    /// The winner's average voting score must exceed this.
    pub recognition_threshold: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_confidence: 0.60,
            min_required_matches: 2,
            recognition_threshold: 0.65,
        }
    }
}

/// Thresholds for the adaptive learning policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Only recognitions whose average score is below this are learned from.
    pub learning_threshold: f32,
    /// A new sample this similar to an existing reference is redundant.
    pub uniqueness_threshold: f32,
    /// Minimum time between two learned samples of the same identity.
    pub cooldown_ms: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_threshold: 0.90,
            uniqueness_threshold: 0.85,
            cooldown_ms: 2000,
        }
    }
}

impl LearningConfig {
    pub fn cooldown(&self) -> Duration {
        millis(self.cooldown_ms)
    }
}

/// Timing of the confirmation state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmConfig {
    /// How long a new identity must be seen before it is attributed and
    /// marked. Zero marks on the first recognizing frame.
    pub confirmation_delay_ms: u64,
    /// How long recognition may be lost before the attribution is dropped.
    pub dropout_ms: u64,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            confirmation_delay_ms: 0,
            dropout_ms: 1000,
        }
    }
}

impl ConfirmConfig {
    pub fn confirmation_delay(&self) -> Duration {
        millis(self.confirmation_delay_ms)
    }

    pub fn dropout(&self) -> Duration {
        millis(self.dropout_ms)
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}
