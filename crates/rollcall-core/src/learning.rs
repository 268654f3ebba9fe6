//! Adaptive reference-set learning.
//!
//! Recognitions that are good but not near-perfect are the ones worth
//! learning from: they show the face under conditions the reference set
//! does not cover yet. Growth is strictly additive; existing samples are
//! never pruned or reweighted.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::config::LearningConfig;
use crate::correlation;
use crate::types::FaceSample;

/// Outcome of offering one observed sample to the policy.
#[derive(Debug, Clone, PartialEq)]
pub enum LearnVerdict {
    /// The sample should be appended to the identity's references.
    Absorb,
    /// The recognition was too confident to teach anything new.
    TooConfident { average_score: f32 },
    /// This identity was learned from too recently.
    CoolingDown,
    /// An existing reference is already this similar.
    Redundant { max_similarity: f32 },
}

impl LearnVerdict {
    pub fn is_absorb(&self) -> bool {
        matches!(self, LearnVerdict::Absorb)
    }
}

/// Decides whether a recognized sample joins its identity's reference set.
#[derive(Debug, Default)]
pub struct LearningPolicy {
    config: LearningConfig,
    last_learned: HashMap<String, NaiveDateTime>,
}

impl LearningPolicy {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            last_learned: HashMap::new(),
        }
    }

    /// Judge `sample`, recognized as `name` with `average_score`, against the
    /// identity's current `references`.
    ///
    /// An [`LearnVerdict::Absorb`] verdict starts the identity's cooldown at
    /// `now`; the caller is expected to append the sample.
    pub fn consider(
        &mut self,
        name: &str,
        average_score: f32,
        sample: &FaceSample,
        references: &[FaceSample],
        now: NaiveDateTime,
    ) -> LearnVerdict {
        if average_score >= self.config.learning_threshold {
            return LearnVerdict::TooConfident { average_score };
        }

        if let Some(last) = self.last_learned.get(name) {
            if now.signed_duration_since(*last) < self.config.cooldown() {
                return LearnVerdict::CoolingDown;
            }
        }

        let max_similarity = references
            .iter()
            .filter_map(|reference| correlation::similarity(sample, reference))
            .fold(0.0f32, f32::max);
        if max_similarity > self.config.uniqueness_threshold {
            return LearnVerdict::Redundant { max_similarity };
        }

        self.last_learned.insert(name.to_string(), now);
        tracing::debug!(name, average_score, max_similarity, "sample accepted for learning");
        LearnVerdict::Absorb
    }

    /// Drop cooldown state for a removed identity.
    pub fn forget(&mut self, name: &str) {
        self.last_learned.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn at(ms: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::milliseconds(ms)
    }

    fn random_sample(seed: u64) -> FaceSample {
        let mut rng = StdRng::seed_from_u64(seed);
        FaceSample::new(16, 16, (0..256).map(|_| rng.gen()).collect()).unwrap()
    }

    #[test]
    fn test_novel_sample_is_absorbed() {
        let mut policy = LearningPolicy::default();
        let refs = vec![random_sample(1), random_sample(2)];
        let verdict = policy.consider("alice", 0.75, &random_sample(3), &refs, at(0));
        assert_eq!(verdict, LearnVerdict::Absorb);
    }

    #[test]
    fn test_confident_match_is_not_learned() {
        let mut policy = LearningPolicy::default();
        let verdict = policy.consider("alice", 0.95, &random_sample(3), &[], at(0));
        assert!(matches!(verdict, LearnVerdict::TooConfident { .. }));
    }

    #[test]
    fn test_same_sample_twice_is_stored_once() {
        let mut policy = LearningPolicy::default();
        let mut refs = vec![random_sample(1), random_sample(2)];
        let sample = random_sample(3);

        let first = policy.consider("alice", 0.75, &sample, &refs, at(0));
        assert!(first.is_absorb());
        refs.push(sample.clone());

        // Well past the cooldown, so only novelty can reject it.
        let second = policy.consider("alice", 0.75, &sample, &refs, at(10_000));
        match second {
            LearnVerdict::Redundant { max_similarity } => assert!(max_similarity > 0.99),
            other => panic!("expected redundant, got {other:?}"),
        }
        assert_eq!(refs.len(), 3);
    }

    #[test]
    fn test_cooldown_is_per_identity() {
        let mut policy = LearningPolicy::default();
        assert!(policy.consider("alice", 0.75, &random_sample(3), &[], at(0)).is_absorb());
        assert_eq!(
            policy.consider("alice", 0.75, &random_sample(4), &[], at(1_500)),
            LearnVerdict::CoolingDown
        );
        assert!(policy.consider("bob", 0.75, &random_sample(5), &[], at(1_500)).is_absorb());
        assert!(policy.consider("alice", 0.75, &random_sample(6), &[], at(2_000)).is_absorb());
    }

    #[test]
    fn test_rejections_do_not_start_cooldown() {
        let mut policy = LearningPolicy::default();
        let sample = random_sample(3);
        let refs = vec![sample.clone()];
        assert!(matches!(
            policy.consider("alice", 0.75, &sample, &refs, at(0)),
            LearnVerdict::Redundant { .. }
        ));
        assert!(policy.consider("alice", 0.75, &random_sample(4), &refs, at(100)).is_absorb());
    }

    #[test]
    fn test_incomparable_references_do_not_block() {
        let mut policy = LearningPolicy::default();
        let other_size = FaceSample::new(8, 8, vec![7; 64]).unwrap();
        let verdict = policy.consider("alice", 0.75, &random_sample(3), &[other_size], at(0));
        assert!(verdict.is_absorb());
    }

    #[test]
    fn test_forget_clears_cooldown() {
        let mut policy = LearningPolicy::default();
        assert!(policy.consider("alice", 0.75, &random_sample(3), &[], at(0)).is_absorb());
        policy.forget("alice");
        assert!(policy.consider("alice", 0.75, &random_sample(4), &[], at(10)).is_absorb());
    }
}
