//! Per-frame confirmation state machine.
//!
//! Tracks who is currently attributed and decides on which frames an
//! attendance write should be attempted. The ledger itself enforces
//! once-per-day uniqueness, so this machine only has to guarantee that
//! every newly recognized identity eventually triggers a write.

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::ConfirmConfig;

/// Current attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmState {
    Idle,
    /// Seen but not yet held for the confirmation delay. Never entered when
    /// the delay is zero.
    Confirming { name: String, since: NaiveDateTime },
    Attributed {
        name: String,
        since: NaiveDateTime,
        /// Day the attendance write was last requested for this attribution.
        marked_on: NaiveDate,
        /// Start of the current recognition dropout, if any.
        lost_since: Option<NaiveDateTime>,
    },
}

/// What a frame did to the attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing attributed before or after.
    Idle,
    /// Candidate is waiting out the confirmation delay.
    Confirming(String),
    /// Newly attributed (or a new day began): attempt an attendance write.
    Confirmed(String),
    /// Same identity is still attributed, possibly within a dropout.
    Held(String),
    /// Dropout exceeded, attribution cleared.
    Released(String),
}

impl Transition {
    /// Identity whose attendance should be written on this frame.
    pub fn mark(&self) -> Option<&str> {
        match self {
            Transition::Confirmed(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ConfirmationMachine {
    config: ConfirmConfig,
    state: ConfirmState,
}

impl ConfirmationMachine {
    pub fn new(config: ConfirmConfig) -> Self {
        Self {
            config,
            state: ConfirmState::Idle,
        }
    }

    pub fn state(&self) -> &ConfirmState {
        &self.state
    }

    /// Currently attributed identity, if any.
    pub fn attributed(&self) -> Option<&str> {
        match &self.state {
            ConfirmState::Attributed { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Advance by one processed frame. `recognized` is the identity the frame
    /// resolved to, or `None` for no face / Unknown.
    pub fn observe(&mut self, recognized: Option<&str>, now: NaiveDateTime) -> Transition {
        let state = std::mem::replace(&mut self.state, ConfirmState::Idle);
        let (next, transition) = self.step(state, recognized, now);
        if let Transition::Confirmed(name) | Transition::Released(name) = &transition {
            tracing::debug!(name = %name, ?transition, "attribution changed");
        }
        self.state = next;
        transition
    }

    /// Clear the attribution if it refers to `name` (identity removed).
    pub fn forget(&mut self, name: &str) {
        let matches = match &self.state {
            ConfirmState::Idle => false,
            ConfirmState::Confirming { name: current, .. }
            | ConfirmState::Attributed { name: current, .. } => current == name,
        };
        if matches {
            self.state = ConfirmState::Idle;
        }
    }

    fn step(
        &self,
        state: ConfirmState,
        recognized: Option<&str>,
        now: NaiveDateTime,
    ) -> (ConfirmState, Transition) {
        match (state, recognized) {
            (ConfirmState::Idle, None) => (ConfirmState::Idle, Transition::Idle),
            (ConfirmState::Idle, Some(name)) => self.begin(name, now),

            (ConfirmState::Confirming { .. }, None) => (ConfirmState::Idle, Transition::Idle),
            (ConfirmState::Confirming { name, since }, Some(seen)) => {
                if name != seen {
                    return self.begin(seen, now);
                }
                if now.signed_duration_since(since) >= self.config.confirmation_delay() {
                    (attributed(&name, now), Transition::Confirmed(name))
                } else {
                    (ConfirmState::Confirming { name: name.clone(), since }, Transition::Confirming(name))
                }
            }

            (
                ConfirmState::Attributed {
                    name,
                    since,
                    marked_on,
                    lost_since,
                },
                None,
            ) => {
                let lost_since = lost_since.unwrap_or(now);
                if now.signed_duration_since(lost_since) > self.config.dropout() {
                    (ConfirmState::Idle, Transition::Released(name))
                } else {
                    (
                        ConfirmState::Attributed {
                            name: name.clone(),
                            since,
                            marked_on,
                            lost_since: Some(lost_since),
                        },
                        Transition::Held(name),
                    )
                }
            }
            (ConfirmState::Attributed { name, since, marked_on, .. }, Some(seen)) => {
                if name != seen {
                    return self.begin(seen, now);
                }
                let today = now.date();
                let transition = if today != marked_on {
                    Transition::Confirmed(name.clone())
                } else {
                    Transition::Held(name.clone())
                };
                (
                    ConfirmState::Attributed {
                        name,
                        since,
                        marked_on: today,
                        lost_since: None,
                    },
                    transition,
                )
            }
        }
    }

    fn begin(&self, name: &str, now: NaiveDateTime) -> (ConfirmState, Transition) {
        if self.config.confirmation_delay_ms == 0 {
            (attributed(name, now), Transition::Confirmed(name.to_string()))
        } else {
            (
                ConfirmState::Confirming {
                    name: name.to_string(),
                    since: now,
                },
                Transition::Confirming(name.to_string()),
            )
        }
    }
}

fn attributed(name: &str, now: NaiveDateTime) -> ConfirmState {
    ConfirmState::Attributed {
        name: name.to_string(),
        since: now,
        marked_on: now.date(),
        lost_since: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(ms: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
            + Duration::milliseconds(ms)
    }

    fn machine() -> ConfirmationMachine {
        ConfirmationMachine::new(ConfirmConfig::default())
    }

    #[test]
    fn test_idle_stays_idle_without_recognition() {
        let mut m = machine();
        assert_eq!(m.observe(None, at(0)), Transition::Idle);
        assert_eq!(m.state(), &ConfirmState::Idle);
    }

    #[test]
    fn test_first_recognition_marks_immediately() {
        let mut m = machine();
        let t = m.observe(Some("alice"), at(0));
        assert_eq!(t.mark(), Some("alice"));
        assert_eq!(m.attributed(), Some("alice"));
    }

    #[test]
    fn test_repeat_recognition_does_not_mark() {
        let mut m = machine();
        m.observe(Some("alice"), at(0));
        let t = m.observe(Some("alice"), at(30));
        assert_eq!(t, Transition::Held("alice".into()));
        assert_eq!(t.mark(), None);
    }

    #[test]
    fn test_switching_identity_marks_new_one() {
        let mut m = machine();
        m.observe(Some("alice"), at(0));
        let t = m.observe(Some("bob"), at(30));
        assert_eq!(t, Transition::Confirmed("bob".into()));
        assert_eq!(m.attributed(), Some("bob"));
    }

    #[test]
    fn test_short_dropout_keeps_attribution() {
        let mut m = machine();
        m.observe(Some("alice"), at(0));
        assert_eq!(m.observe(None, at(100)), Transition::Held("alice".into()));
        assert_eq!(m.observe(None, at(1_100)), Transition::Held("alice".into()));
        // Recognition returns before the dropout elapsed: no new mark.
        assert_eq!(m.observe(Some("alice"), at(1_150)), Transition::Held("alice".into()));
        assert_eq!(m.attributed(), Some("alice"));
    }

    #[test]
    fn test_sustained_dropout_releases() {
        let mut m = machine();
        m.observe(Some("alice"), at(0));
        m.observe(None, at(100));
        assert_eq!(m.observe(None, at(1_101)), Transition::Released("alice".into()));
        assert_eq!(m.state(), &ConfirmState::Idle);
        // Returning after release marks again (the ledger deduplicates).
        assert_eq!(m.observe(Some("alice"), at(2_000)).mark(), Some("alice"));
    }

    #[test]
    fn test_recognition_resets_dropout_clock() {
        let mut m = machine();
        m.observe(Some("alice"), at(0));
        m.observe(None, at(100));
        m.observe(Some("alice"), at(900));
        assert_eq!(m.observe(None, at(1_500)), Transition::Held("alice".into()));
        assert_eq!(m.observe(None, at(2_400)), Transition::Held("alice".into()));
        assert_eq!(m.observe(None, at(2_501)), Transition::Released("alice".into()));
    }

    #[test]
    fn test_new_day_marks_again() {
        let mut m = machine();
        let late = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(23, 59, 59).unwrap();
        m.observe(Some("alice"), late);
        let t = m.observe(Some("alice"), late + Duration::milliseconds(1_500));
        assert_eq!(t, Transition::Confirmed("alice".into()));
    }

    #[test]
    fn test_confirmation_delay_defers_mark() {
        let mut m = ConfirmationMachine::new(ConfirmConfig {
            confirmation_delay_ms: 500,
            ..ConfirmConfig::default()
        });
        assert_eq!(m.observe(Some("alice"), at(0)), Transition::Confirming("alice".into()));
        assert_eq!(m.observe(Some("alice"), at(200)), Transition::Confirming("alice".into()));
        assert_eq!(m.observe(Some("alice"), at(500)), Transition::Confirmed("alice".into()));
    }

    #[test]
    fn test_confirmation_restarts_on_switch_or_loss() {
        let mut m = ConfirmationMachine::new(ConfirmConfig {
            confirmation_delay_ms: 500,
            ..ConfirmConfig::default()
        });
        m.observe(Some("alice"), at(0));
        assert_eq!(m.observe(Some("bob"), at(400)), Transition::Confirming("bob".into()));
        assert_eq!(m.observe(Some("bob"), at(800)), Transition::Confirming("bob".into()));
        assert_eq!(m.observe(None, at(850)), Transition::Idle);
        assert_eq!(m.observe(Some("bob"), at(900)), Transition::Confirming("bob".into()));
    }

    #[test]
    fn test_forget_only_clears_matching_identity() {
        let mut m = machine();
        m.observe(Some("alice"), at(0));
        m.forget("bob");
        assert_eq!(m.attributed(), Some("alice"));
        m.forget("alice");
        assert_eq!(m.state(), &ConfirmState::Idle);
    }
}
