//! rollcall-core — Face identity decisions for attendance marking.
//!
//! Classical template matching on grayscale face crops: a normalized
//! cross-correlation voter decides identities, a learning policy grows the
//! reference sets, and a confirmation state machine decides when attendance
//! is written. No I/O happens here; persistence lives in `rollcall-store`.

pub mod config;
pub mod confirm;
pub mod correlation;
pub mod enrollment;
pub mod frame;
pub mod learning;
pub mod matcher;
pub mod types;

pub use config::{ConfirmConfig, LearningConfig, MatchConfig};
pub use confirm::{ConfirmState, ConfirmationMachine, Transition};
pub use enrollment::{CaptureProgress, EnrollmentCapture, EnrollmentError};
pub use frame::Frame;
pub use learning::{LearnVerdict, LearningPolicy};
pub use matcher::{Matcher, VotingMatcher};
pub use types::{BoundingBox, CandidateScore, FaceSample, MatchDecision, Profile, UNKNOWN_LABEL};
