//! Attendance ledger: at most one record per identity per calendar day.
//!
//! Idempotency is enforced by the `UNIQUE(identity, date)` constraint, so a
//! mark is a single `INSERT OR IGNORE` — atomic at the storage layer and
//! safe against concurrent callers on any handle or connection.

use crate::db::StoreError;
use chrono::{Datelike, Local, NaiveDate, NaiveTime};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::{Arc, Mutex};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";

/// One attendance row. Never mutated, never deleted by this crate.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub identity: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: String,
}

/// Per-identity summary of the current month up to `today`.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlySummary {
    pub identity: String,
    /// Month key, `YYYY-MM`.
    pub month: String,
    pub total_days: u32,
    pub present_days: u32,
    pub absent_days: u32,
    pub attendance_percentage: f64,
}

/// Present/absent headcount for one day, over identities with enrolled faces.
#[derive(Debug, Clone, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub present_count: u32,
    pub absent_count: u32,
}

/// Handle to the attendance table.
#[derive(Clone)]
pub struct AttendanceLedger {
    conn: Arc<Mutex<Connection>>,
}

impl AttendanceLedger {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Mark `identity` present today. Returns `true` if a new record was
    /// inserted, `false` if one already existed for today (no-op).
    pub fn mark(&self, identity: &str) -> Result<bool, StoreError> {
        let now = Local::now();
        self.mark_at(identity, now.date_naive(), now.time())
    }

    /// Mark `identity` present on an explicit date. The check-and-insert is
    /// one statement: the UNIQUE constraint swallows the duplicate, and the
    /// change count says whether this call won.
    pub fn mark_at(
        &self,
        identity: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO attendance (identity, date, time, status)
             VALUES (?1, ?2, ?3, 'present')",
            params![
                identity,
                date.format(DATE_FMT).to_string(),
                time.format(TIME_FMT).to_string(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Whether a record exists for `(identity, date)`.
    pub fn has_marked(&self, identity: &str, date: NaiveDate) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE identity = ?1 AND date = ?2",
            params![identity, date.format(DATE_FMT).to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// All records for one identity, newest date first.
    pub fn records_for(&self, identity: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.query_records(
            "SELECT identity, date, time, status FROM attendance
             WHERE identity = ?1 ORDER BY date DESC",
            params![identity],
        )
    }

    /// Every record in the ledger, newest date first.
    pub fn all_records(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.query_records(
            "SELECT identity, date, time, status FROM attendance ORDER BY date DESC",
            params![],
        )
    }

    /// Total number of attendance records.
    pub fn record_count(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Summary of `identity`'s month containing `today`, counted from the
    /// 1st through `today` inclusive. Absence is derived, not stored.
    pub fn monthly_summary(
        &self,
        identity: &str,
        today: NaiveDate,
    ) -> Result<MonthlySummary, StoreError> {
        let month = format!("{:04}-{:02}", today.year(), today.month());
        let total_days = today.day();

        let present_days: u32 = {
            let conn = self.conn.lock().unwrap();
            conn.query_row(
                "SELECT COUNT(*) FROM attendance WHERE identity = ?1 AND date LIKE ?2",
                params![identity, format!("{month}-%")],
                |row| row.get(0),
            )?
        };

        let absent_days = total_days.saturating_sub(present_days);
        let attendance_percentage = if total_days > 0 {
            (present_days as f64 / total_days as f64 * 10000.0).round() / 100.0
        } else {
            0.0
        };

        Ok(MonthlySummary {
            identity: identity.to_string(),
            month,
            total_days,
            present_days,
            absent_days,
            attendance_percentage,
        })
    }

    /// Present/absent headcount for `date`. The population is the number of
    /// identities with registered faces — the only population this system
    /// knows about.
    pub fn day_summary(&self, date: NaiveDate) -> Result<DaySummary, StoreError> {
        let conn = self.conn.lock().unwrap();

        let present_count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE date = ?1",
            params![date.format(DATE_FMT).to_string()],
            |row| row.get(0),
        )?;
        let population: u32 =
            conn.query_row("SELECT COUNT(DISTINCT identity) FROM faces", [], |row| {
                row.get(0)
            })?;

        Ok(DaySummary {
            date,
            present_count,
            absent_count: population.saturating_sub(present_count),
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (identity, date, time, status) = row?;
            let date = NaiveDate::parse_from_str(&date, DATE_FMT)
                .map_err(|e| StoreError::CorruptRow(format!("date {date}: {e}")))?;
            let time = NaiveTime::parse_from_str(&time, TIME_FMT)
                .map_err(|e| StoreError::CorruptRow(format!("time {time}: {e}")))?;
            records.push(AttendanceRecord {
                identity,
                date,
                time,
                status,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use rollcall_core::Embedding;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_mark_twice_same_day_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let ledger = db.ledger();
        let day = date(2026, 1, 20);

        // 09:00 inserts, 09:05 is a no-op.
        assert!(ledger.mark_at("S100", day, time(9, 0, 0)).unwrap());
        assert!(!ledger.mark_at("S100", day, time(9, 5, 0)).unwrap());

        let records = ledger.records_for("S100").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].time, time(9, 0, 0));
        assert_eq!(records[0].status, "present");
    }

    #[test]
    fn test_mark_different_days() {
        let db = Database::in_memory().unwrap();
        let ledger = db.ledger();

        assert!(ledger.mark_at("S100", date(2026, 1, 20), time(9, 0, 0)).unwrap());
        assert!(ledger.mark_at("S100", date(2026, 1, 21), time(9, 0, 0)).unwrap());
        assert_eq!(ledger.record_count().unwrap(), 2);
    }

    #[test]
    fn test_has_marked() {
        let db = Database::in_memory().unwrap();
        let ledger = db.ledger();
        let day = date(2026, 1, 20);

        assert!(!ledger.has_marked("S100", day).unwrap());
        ledger.mark_at("S100", day, time(8, 30, 0)).unwrap();
        assert!(ledger.has_marked("S100", day).unwrap());
        assert!(!ledger.has_marked("S100", date(2026, 1, 21)).unwrap());
        assert!(!ledger.has_marked("S200", day).unwrap());
    }

    #[test]
    fn test_concurrent_marks_produce_one_record() {
        let db = Database::in_memory().unwrap();
        let day = date(2026, 1, 20);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = db.ledger();
                std::thread::spawn(move || {
                    ledger
                        .mark_at("S100", day, time(9, 0, i as u32))
                        .unwrap()
                })
            })
            .collect();

        let inserted: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(inserted, 1);
        assert_eq!(db.ledger().record_count().unwrap(), 1);
    }

    #[test]
    fn test_records_for_newest_first() {
        let db = Database::in_memory().unwrap();
        let ledger = db.ledger();

        ledger.mark_at("S100", date(2026, 1, 18), time(9, 0, 0)).unwrap();
        ledger.mark_at("S100", date(2026, 1, 20), time(9, 0, 0)).unwrap();
        ledger.mark_at("S200", date(2026, 1, 19), time(9, 0, 0)).unwrap();

        let records = ledger.records_for("S100").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, date(2026, 1, 20));
        assert_eq!(records[1].date, date(2026, 1, 18));

        assert_eq!(ledger.all_records().unwrap().len(), 3);
    }

    #[test]
    fn test_monthly_summary_scenario() {
        let db = Database::in_memory().unwrap();
        let ledger = db.ledger();

        // Present on the 1st, 3rd, 5th and 7th; today is the 10th.
        for d in [1, 3, 5, 7] {
            ledger.mark_at("S100", date(2026, 1, d), time(9, 0, 0)).unwrap();
        }

        let summary = ledger.monthly_summary("S100", date(2026, 1, 10)).unwrap();
        assert_eq!(summary.month, "2026-01");
        assert_eq!(summary.total_days, 10);
        assert_eq!(summary.present_days, 4);
        assert_eq!(summary.absent_days, 6);
        assert!((summary.attendance_percentage - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_summary_ignores_other_months() {
        let db = Database::in_memory().unwrap();
        let ledger = db.ledger();

        ledger.mark_at("S100", date(2025, 12, 31), time(9, 0, 0)).unwrap();
        ledger.mark_at("S100", date(2026, 1, 2), time(9, 0, 0)).unwrap();

        let summary = ledger.monthly_summary("S100", date(2026, 1, 5)).unwrap();
        assert_eq!(summary.present_days, 1);
        assert_eq!(summary.total_days, 5);
    }

    #[test]
    fn test_day_summary_over_enrolled_population() {
        let db = Database::in_memory().unwrap();
        let faces = db.face_store();
        let ledger = db.ledger();

        for identity in ["S100", "S200", "S300"] {
            faces
                .put(
                    identity,
                    &[Embedding {
                        values: vec![0.1, 0.2],
                        model_version: None,
                    }],
                )
                .unwrap();
        }

        let day = date(2026, 1, 20);
        ledger.mark_at("S100", day, time(9, 0, 0)).unwrap();
        ledger.mark_at("S300", day, time(9, 30, 0)).unwrap();

        let summary = ledger.day_summary(day).unwrap();
        assert_eq!(summary.present_count, 2);
        assert_eq!(summary.absent_count, 1);
    }
}
