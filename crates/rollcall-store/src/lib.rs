//! rollcall-store — Persistence for enrolled profiles and attendance.
//!
//! Profiles are sealed with AES-256-GCM under a locally generated key and
//! rewritten in full after every change. Attendance lives in a SQLite table
//! keyed by (name, date).

pub mod crypto;
pub mod ledger;
pub mod profiles;

use thiserror::Error;

pub use crypto::{CryptoError, ProfileKey};
pub use ledger::{AttendanceLedger, AttendanceRecord, LedgerError, MarkOutcome};
pub use profiles::ProfileStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("encoding: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("unsupported profile schema version {0}")]
    UnsupportedSchema(u32),
    #[error("cannot enroll {0:?} without samples")]
    EmptyEnrollment(String),
    #[error("{0:?} is reserved and cannot be stored as an identity")]
    ReservedName(String),
}
