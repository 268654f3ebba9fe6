//! Attendance ledger on SQLite.
//!
//! One row per (name, date). The first write of the day wins and fixes the
//! recorded time; later writes for the same pair are no-ops enforced by a
//! `UNIQUE` constraint, so marking can be requested on every frame.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::UNKNOWN_LABEL;
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    UNIQUE (name, date)
);
";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("refusing to mark attendance for unresolved identity {0:?}")]
    UnresolvedIdentity(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    Recorded(AttendanceRecord),
    AlreadyPresent,
}

pub struct AttendanceLedger {
    conn: Connection,
}

impl AttendanceLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "attendance ledger opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Record `name` as present on `timestamp`'s date unless already recorded.
    pub fn mark_present(
        &self,
        name: &str,
        timestamp: NaiveDateTime,
    ) -> Result<MarkOutcome, LedgerError> {
        if name.trim().is_empty() || name == UNKNOWN_LABEL {
            return Err(LedgerError::UnresolvedIdentity(name.to_string()));
        }

        let record = AttendanceRecord {
            name: name.to_string(),
            date: timestamp.date(),
            time: truncate_seconds(timestamp.time()),
        };
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO attendance (name, date, time) VALUES (?1, ?2, ?3)",
            params![
                record.name,
                record.date.format(DATE_FORMAT).to_string(),
                record.time.format(TIME_FORMAT).to_string(),
            ],
        )?;

        if inserted == 0 {
            return Ok(MarkOutcome::AlreadyPresent);
        }
        tracing::info!(name, date = %record.date, time = %record.time, "attendance recorded");
        Ok(MarkOutcome::Recorded(record))
    }

    /// Delete every record for `name`, returning how many were removed.
    pub fn purge(&self, name: &str) -> Result<usize, LedgerError> {
        let removed = self
            .conn
            .execute("DELETE FROM attendance WHERE name = ?1", params![name])?;
        tracing::info!(name, removed, "attendance purged");
        Ok(removed)
    }

    /// All records in insertion order.
    pub fn read_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, date, time FROM attendance ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let date: String = row.get(1)?;
            let time: String = row.get(2)?;
            Ok(AttendanceRecord {
                name: row.get(0)?,
                date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
                time: NaiveTime::parse_from_str(&time, TIME_FORMAT)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
            })
        })?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn is_marked(&self, name: &str, date: NaiveDate) -> Result<bool, LedgerError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE name = ?1 AND date = ?2",
            params![name, date.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn truncate_seconds(time: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    time.with_nanosecond(0).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_first_mark_of_day_wins() {
        let ledger = AttendanceLedger::open_in_memory().unwrap();
        let first = ledger.mark_present("alice", ts(4, 9, 0, 5)).unwrap();
        assert!(matches!(first, MarkOutcome::Recorded(_)));
        let again = ledger.mark_present("alice", ts(4, 15, 30, 0)).unwrap();
        assert_eq!(again, MarkOutcome::AlreadyPresent);

        let all = ledger.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].time, NaiveTime::from_hms_opt(9, 0, 5).unwrap());
    }

    #[test]
    fn test_names_and_days_are_independent() {
        let ledger = AttendanceLedger::open_in_memory().unwrap();
        ledger.mark_present("alice", ts(4, 9, 0, 0)).unwrap();
        ledger.mark_present("bob", ts(4, 9, 1, 0)).unwrap();
        ledger.mark_present("alice", ts(5, 9, 0, 0)).unwrap();
        let names: Vec<_> = ledger
            .read_all()
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.date.format("%d").to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("alice".to_string(), "04".to_string()),
                ("bob".to_string(), "04".to_string()),
                ("alice".to_string(), "05".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_is_rejected() {
        let ledger = AttendanceLedger::open_in_memory().unwrap();
        let err = ledger.mark_present(UNKNOWN_LABEL, ts(4, 9, 0, 0)).unwrap_err();
        assert!(matches!(err, LedgerError::UnresolvedIdentity(_)));
        assert!(ledger.mark_present("  ", ts(4, 9, 0, 0)).is_err());
        assert!(ledger.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_purge_only_touches_one_name() {
        let ledger = AttendanceLedger::open_in_memory().unwrap();
        ledger.mark_present("alice", ts(4, 9, 0, 0)).unwrap();
        ledger.mark_present("alice", ts(5, 9, 0, 0)).unwrap();
        ledger.mark_present("bob", ts(4, 9, 0, 0)).unwrap();
        assert_eq!(ledger.purge("alice").unwrap(), 2);
        assert_eq!(ledger.purge("alice").unwrap(), 0);
        let all = ledger.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "bob");
    }

    #[test]
    fn test_is_marked() {
        let ledger = AttendanceLedger::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert!(!ledger.is_marked("alice", day).unwrap());
        ledger.mark_present("alice", ts(4, 9, 0, 0)).unwrap();
        assert!(ledger.is_marked("alice", day).unwrap());
    }

    #[test]
    fn test_file_ledger_survives_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "rollcall-ledger-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(1)
        ));
        let path = dir.join("attendance.db");
        {
            let ledger = AttendanceLedger::open(&path).unwrap();
            ledger.mark_present("alice", ts(4, 9, 0, 0)).unwrap();
        }
        let ledger = AttendanceLedger::open(&path).unwrap();
        assert_eq!(
            ledger.mark_present("alice", ts(4, 10, 0, 0)).unwrap(),
            MarkOutcome::AlreadyPresent
        );
        std::fs::remove_dir_all(dir).unwrap();
    }
}
