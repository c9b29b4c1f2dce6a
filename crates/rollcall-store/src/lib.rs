//! rollcall-store — SQLite persistence for enrolled faces and attendance.
//!
//! Two tables: `faces` (one row per stored embedding vector) and
//! `attendance` (one row per identity per day, enforced by a UNIQUE
//! constraint so the idempotent mark is a single atomic statement).

pub mod db;
pub mod faces;
pub mod ledger;

pub use db::{Database, StoreError};
pub use faces::FaceStore;
pub use ledger::{AttendanceLedger, AttendanceRecord, DaySummary, MonthlySummary};
