use serde::{Deserialize, Serialize};

use crate::correlation;

/// Label reported for a face that did not resolve to an enrolled identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector confidence. Sidecar files written by hand may omit it.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: default_confidence(),
        }
    }
}

/// A grayscale face patch cropped to a detected bounding box.
///
/// Samples carry their own dimensions; two samples of different sizes are
/// simply not comparable (see [`FaceSample::similarity`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceSample {
    pub width: u32,
    pub height: u32,
    /// Row-major luma pixels, `width * height` bytes.
    pub pixels: Vec<u8>,
}

impl FaceSample {
    /// Build a sample, returning `None` when the pixel buffer does not match
    /// the stated dimensions or the patch is empty.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Normalized cross-correlation against another sample of the same size.
    ///
    /// Returns a value in [-1, 1], or `None` if the sizes differ.
    pub fn similarity(&self, other: &FaceSample) -> Option<f32> {
        correlation::similarity(self, other)
    }
}

/// An enrolled identity and its reference samples, newest last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub samples: Vec<FaceSample>,
}

/// Per-identity voting tally from one match pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub name: String,
    /// Reference samples that scored above the match-confidence threshold.
    pub match_count: usize,
    /// Mean score of only the samples counted in `match_count` (0 when none).
    pub average_score: f32,
    /// Highest score of any comparable reference sample of this identity.
    pub best_score: f32,
}

/// Result of matching one observed face against the whole profile store.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    /// Recognized identity, or `None` for "Unknown".
    pub identity: Option<String>,
    /// The winner's average score when recognized, otherwise the single best
    /// individual score across all identities. Always in [0, 1].
    pub confidence: f32,
    /// Tallies in profile store order.
    pub candidates: Vec<CandidateScore>,
}

impl MatchDecision {
    pub fn unknown(best_score: f32, candidates: Vec<CandidateScore>) -> Self {
        Self {
            identity: None,
            confidence: best_score.clamp(0.0, 1.0),
            candidates,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.identity.is_some()
    }

    /// Display label: the identity name or [`UNKNOWN_LABEL`].
    pub fn label(&self) -> &str {
        self.identity.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    /// Tally of the recognized identity, if any.
    pub fn winner(&self) -> Option<&CandidateScore> {
        let name = self.identity.as_deref()?;
        self.candidates.iter().find(|c| c.name == name)
    }
}
