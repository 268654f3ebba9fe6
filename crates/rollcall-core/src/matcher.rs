//! Multi-sample voting matcher.
//!
//! Every reference sample of every identity casts a vote when its
//! correlation with the probe clears `match_confidence`. The identity with
//! the most votes wins, and is recognized only if it has enough votes and
//! its voting samples agree strongly enough on average. A single lucky
//! reference match is never enough on its own.

use crate::config::MatchConfig;
use crate::correlation;
use crate::types::{CandidateScore, FaceSample, MatchDecision, Profile};

/// Strategy for deciding which enrolled identity (if any) a probe belongs to.
pub trait Matcher {
    fn decide(&self, probe: &FaceSample, gallery: &[Profile]) -> MatchDecision;
}

/// Normalized cross-correlation template voter.
#[derive(Debug, Clone, Default)]
pub struct VotingMatcher {
    config: MatchConfig,
}

impl VotingMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Tally one identity's reference samples against the probe.
    fn tally(&self, probe: &FaceSample, profile: &Profile) -> CandidateScore {
        let mut match_count = 0usize;
        let mut voting_sum = 0.0f32;
        let mut best_score = 0.0f32;

        for reference in &profile.samples {
            // Different pixel sizes are skipped, not errors.
            let Some(score) = correlation::similarity(probe, reference) else {
                continue;
            };
            best_score = best_score.max(score);
            if score > self.config.match_confidence {
                match_count += 1;
                voting_sum += score;
            }
        }

        let average_score = if match_count > 0 {
            voting_sum / match_count as f32
        } else {
            0.0
        };

        CandidateScore {
            name: profile.name.clone(),
            match_count,
            average_score,
            best_score,
        }
    }
}

impl Matcher for VotingMatcher {
    fn decide(&self, probe: &FaceSample, gallery: &[Profile]) -> MatchDecision {
        let candidates: Vec<CandidateScore> =
            gallery.iter().map(|profile| self.tally(probe, profile)).collect();

        let best_score = candidates
            .iter()
            .map(|c| c.best_score)
            .fold(0.0f32, f32::max);

        // Highest vote count wins; strict comparison keeps the first-seen
        // identity on ties.
        let mut leader: Option<&CandidateScore> = None;
        for candidate in &candidates {
            if leader.map_or(true, |l| candidate.match_count > l.match_count) {
                leader = Some(candidate);
            }
        }

        let recognized = leader.filter(|l| {
            l.match_count >= self.config.min_required_matches
                && l.average_score > self.config.recognition_threshold
        });

        match recognized {
            Some(winner) => {
                tracing::trace!(
                    name = %winner.name,
                    votes = winner.match_count,
                    score = winner.average_score,
                    "probe recognized"
                );
                MatchDecision {
                    identity: Some(winner.name.clone()),
                    confidence: winner.average_score.clamp(0.0, 1.0),
                    candidates,
                }
            }
            None => MatchDecision::unknown(best_score, candidates),
        }
    }
}
