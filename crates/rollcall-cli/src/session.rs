//! Per-frame processing context.
//!
//! A `Session` owns everything one processing pipeline mutates: the profile
//! store, the attendance ledger, the confirmation machine, the learning
//! cooldowns and an optional enrollment capture. Frames are processed one at
//! a time through [`Session::process_frame`].

use chrono::NaiveDateTime;
use rollcall_core::frame::normalize;
use rollcall_core::{
    BoundingBox, CaptureProgress, ConfirmationMachine, EnrollmentCapture, EnrollmentError,
    FaceSample, Frame, LearningPolicy, Matcher, VotingMatcher, UNKNOWN_LABEL,
};
use rollcall_store::{
    AttendanceLedger, AttendanceRecord, LedgerError, MarkOutcome, ProfileStore, StoreError,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("profile store: {0}")]
    Store(#[from] StoreError),
    #[error("attendance ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("enrollment: {0}")]
    Enrollment(#[from] EnrollmentError),
    #[error("an enrollment for {0:?} is already in progress")]
    EnrollmentInProgress(String),
}

/// Label and score drawn for one detected face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceReport {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

/// Everything the display sink needs for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub faces: Vec<FaceReport>,
    pub status: String,
    /// Attendance written by this frame.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub marked: Vec<AttendanceRecord>,
    /// Identities whose reference set grew on this frame.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub learned: Vec<String>,
    /// Identity whose enrollment capture completed on this frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrolled: Option<String>,
}

impl FrameReport {
    fn status_only(faces: Vec<FaceReport>, status: String) -> Self {
        Self {
            faces,
            status,
            marked: Vec::new(),
            learned: Vec::new(),
            enrolled: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed { purged_records: usize },
    NotFound,
}

struct Recognition {
    name: String,
    score: f32,
    sample: FaceSample,
}

pub struct Session {
    store: ProfileStore,
    ledger: AttendanceLedger,
    matcher: VotingMatcher,
    confirmation: ConfirmationMachine,
    learning: LearningPolicy,
    capture: Option<EnrollmentCapture>,
    required_samples: usize,
    sample_size: u32,
}

impl Session {
    /// Open the store and ledger at the configured paths.
    pub fn open(config: &Config) -> Result<Self, SessionError> {
        let store = ProfileStore::open(config.profile_path(), &config.key_path())?;
        let ledger = AttendanceLedger::open(&config.attendance_path())?;
        tracing::info!(
            identities = store.len(),
            data_dir = %config.data_dir.display(),
            "session opened"
        );
        Ok(Self::new(store, ledger, config))
    }

    pub fn new(store: ProfileStore, ledger: AttendanceLedger, config: &Config) -> Self {
        Self {
            store,
            ledger,
            matcher: VotingMatcher::new(config.matching.clone()),
            confirmation: ConfirmationMachine::new(config.confirm.clone()),
            learning: LearningPolicy::new(config.learning.clone()),
            capture: None,
            required_samples: config.required_samples,
            sample_size: config.sample_size,
        }
    }

    /// Process one frame with its detected face boxes.
    ///
    /// While an enrollment capture is active the first face of the frame is
    /// collected and nothing is matched.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        faces: &[BoundingBox],
        now: NaiveDateTime,
    ) -> Result<FrameReport, SessionError> {
        let samples: Vec<Option<FaceSample>> = faces
            .iter()
            .map(|bbox| frame.crop(bbox).map(|s| normalize(s, self.sample_size)))
            .collect();

        if self.capture.is_some() {
            return self.capture_frame(faces, samples, now);
        }

        let mut reports = Vec::with_capacity(faces.len());
        let mut recognized: Vec<Recognition> = Vec::new();
        for (bbox, sample) in faces.iter().zip(samples) {
            let Some(sample) = sample else {
                reports.push(FaceReport {
                    bbox: bbox.clone(),
                    label: UNKNOWN_LABEL.to_string(),
                    confidence: 0.0,
                });
                continue;
            };
            let decision = self.matcher.decide(&sample, self.store.profiles());
            reports.push(FaceReport {
                bbox: bbox.clone(),
                label: decision.label().to_string(),
                confidence: decision.confidence,
            });
            if let Some(name) = decision.identity {
                recognized.push(Recognition {
                    name,
                    score: decision.confidence,
                    sample,
                });
            }
        }

        // Strongest recognized face drives the attribution; first wins ties.
        let lead = recognized
            .iter()
            .fold(None::<&Recognition>, |best, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            });
        let lead_name = lead.map(|r| r.name.as_str());
        let transition = self.confirmation.observe(lead_name, now);

        // The attributed face is written when the machine confirms it; every
        // other recognized face is written on sight and deduplicated by the ledger.
        let mut pending: Vec<&str> = transition.mark().into_iter().collect();
        for r in &recognized {
            let name = r.name.as_str();
            if Some(name) != lead_name && !pending.contains(&name) {
                pending.push(name);
            }
        }
        let mut marked = Vec::new();
        for name in pending {
            if let MarkOutcome::Recorded(record) = self.ledger.mark_present(name, now)? {
                marked.push(record);
            }
        }

        let lead_marked = lead.is_some_and(|r| marked.iter().any(|m| m.name == r.name));
        let status = match lead {
            Some(r) if lead_marked => {
                format!("Confirmed & Marked: {} (Score: {:.2})", r.name, r.score)
            }
            Some(r) => format!("Recognized: {} (Score: {:.2})", r.name, r.score),
            None if faces.is_empty() => "No face detected".to_string(),
            None => {
                let best = reports.iter().map(|f| f.confidence).fold(0.0f32, f32::max);
                format!("{UNKNOWN_LABEL} (Best: {best:.2})")
            }
        };

        let mut learned = Vec::new();
        for Recognition {
            name,
            score,
            sample,
        } in recognized
        {
            let references = self.store.samples(&name).unwrap_or(&[]);
            let verdict = self
                .learning
                .consider(&name, score, &sample, references, now);
            if verdict.is_absorb() {
                let count = self.store.add_sample(&name, sample)?;
                tracing::info!(name = %name, score, samples = count, "learned new reference sample");
                learned.push(name);
            } else {
                tracing::debug!(name = %name, ?verdict, "sample not learned");
            }
        }

        Ok(FrameReport {
            faces: reports,
            status,
            marked,
            learned,
            enrolled: None,
        })
    }

    fn capture_frame(
        &mut self,
        faces: &[BoundingBox],
        samples: Vec<Option<FaceSample>>,
        now: NaiveDateTime,
    ) -> Result<FrameReport, SessionError> {
        // Attribution still lapses normally while enrolling.
        self.confirmation.observe(None, now);

        let Some(capture) = self.capture.as_mut() else {
            return Ok(FrameReport::status_only(Vec::new(), "No face detected".into()));
        };
        let name = capture.name().to_string();
        let reports: Vec<FaceReport> = faces
            .iter()
            .map(|bbox| FaceReport {
                bbox: bbox.clone(),
                label: name.clone(),
                confidence: 0.0,
            })
            .collect();

        let Some(sample) = samples.into_iter().flatten().next() else {
            return Ok(FrameReport::status_only(reports, "No face detected".into()));
        };

        match capture.push(sample) {
            CaptureProgress::Collecting { captured, required } => {
                tracing::debug!(name = %name, captured, required, "enrollment sample captured");
                Ok(FrameReport::status_only(
                    reports,
                    format!("Capturing sample {captured}/{required} for {name}"),
                ))
            }
            CaptureProgress::Complete => {
                let (name, samples) = match self.capture.take().map(EnrollmentCapture::finish) {
                    Some(Ok(done)) => done,
                    unfinished => {
                        self.capture = unfinished.and_then(Result::err);
                        return Ok(FrameReport::status_only(reports, "No face detected".into()));
                    }
                };
                let count = samples.len();
                self.store.enroll(&name, samples)?;
                self.learning.forget(&name);
                let mut report =
                    FrameReport::status_only(reports, format!("Enrolled {name} with {count} samples"));
                report.enrolled = Some(name);
                Ok(report)
            }
        }
    }

    /// Start collecting `required_samples` face crops for `name`.
    pub fn begin_enrollment(&mut self, name: &str) -> Result<(), SessionError> {
        if let Some(active) = &self.capture {
            return Err(SessionError::EnrollmentInProgress(active.name().to_string()));
        }
        let capture = EnrollmentCapture::new(name, self.required_samples)?;
        tracing::info!(name = %capture.name(), required = capture.required(), "enrollment started");
        self.capture = Some(capture);
        Ok(())
    }

    /// Abandon the active capture. Returns the name and the number of
    /// samples discarded.
    pub fn cancel_enrollment(&mut self) -> Option<(String, usize)> {
        let capture = self.capture.take()?;
        let name = capture.name().to_string();
        Some((name, capture.cancel()))
    }

    /// Remove an identity with its samples and attendance history.
    pub fn remove_identity(&mut self, name: &str) -> Result<RemoveOutcome, SessionError> {
        if !self.store.remove(name)? {
            return Ok(RemoveOutcome::NotFound);
        }
        let purged_records = self.ledger.purge(name)?;
        self.confirmation.forget(name);
        self.learning.forget(name);
        Ok(RemoveOutcome::Removed { purged_records })
    }

    pub fn names(&self) -> Vec<String> {
        self.store.names()
    }

    pub fn sample_count(&self, name: &str) -> Option<usize> {
        self.store.samples(name).map(<[FaceSample]>::len)
    }

    /// Enrolled names with their current reference sample counts.
    pub fn roster(&self) -> Vec<(String, usize)> {
        self.names()
            .into_iter()
            .filter_map(|name| {
                let count = self.sample_count(&name)?;
                Some((name, count))
            })
            .collect()
    }

    pub fn attendance(&self) -> Result<Vec<AttendanceRecord>, SessionError> {
        Ok(self.ledger.read_all()?)
    }
}
