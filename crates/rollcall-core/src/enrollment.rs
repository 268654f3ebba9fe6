//! Multi-frame enrollment capture.
//!
//! Collects a fixed number of face crops for a new identity. Nothing is
//! written anywhere until the capture is complete; dropping or cancelling
//! an incomplete capture discards its samples.

use thiserror::Error;

use crate::types::{FaceSample, UNKNOWN_LABEL};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("enrollment name must not be empty")]
    EmptyName,
    #[error("enrollment requires at least one sample")]
    NoSamplesRequired,
    #[error("{0:?} is reserved for unrecognized faces")]
    ReservedName(String),
}

/// Progress after pushing one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureProgress {
    /// `captured` of `required` samples collected so far.
    Collecting { captured: usize, required: usize },
    /// All samples collected; the capture yields them via [`EnrollmentCapture::finish`].
    Complete,
}

#[derive(Debug)]
pub struct EnrollmentCapture {
    name: String,
    required: usize,
    samples: Vec<FaceSample>,
}

impl EnrollmentCapture {
    pub fn new(name: &str, required: usize) -> Result<Self, EnrollmentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EnrollmentError::EmptyName);
        }
        if name == UNKNOWN_LABEL {
            return Err(EnrollmentError::ReservedName(name.to_string()));
        }
        if required == 0 {
            return Err(EnrollmentError::NoSamplesRequired);
        }
        Ok(Self {
            name: name.to_string(),
            required,
            samples: Vec::with_capacity(required),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn captured(&self) -> usize {
        self.samples.len()
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() >= self.required
    }

    /// Add one face crop. Extra samples past the required count are ignored.
    pub fn push(&mut self, sample: FaceSample) -> CaptureProgress {
        if !self.is_complete() {
            self.samples.push(sample);
        }
        if self.is_complete() {
            CaptureProgress::Complete
        } else {
            CaptureProgress::Collecting {
                captured: self.samples.len(),
                required: self.required,
            }
        }
    }

    /// Consume a complete capture, returning `(name, samples)`. An incomplete
    /// capture is handed back unchanged.
    pub fn finish(self) -> Result<(String, Vec<FaceSample>), Self> {
        if self.is_complete() {
            Ok((self.name, self.samples))
        } else {
            Err(self)
        }
    }

    /// Abandon the capture, returning how many samples were discarded.
    pub fn cancel(self) -> usize {
        tracing::info!(name = %self.name, discarded = self.samples.len(), "enrollment cancelled");
        self.samples.len()
    }
}
