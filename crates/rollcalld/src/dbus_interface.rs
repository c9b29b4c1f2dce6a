use crate::engine::{EngineError, EngineHandle};
use chrono::{Local, NaiveDate};
use rollcall_store::{AttendanceLedger, FaceStore, StoreError};
use zbus::fdo;
use zbus::interface;

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    faces: FaceStore,
    ledger: AttendanceLedger,
    kiosk: bool,
    match_tolerance: f32,
}

impl AttendanceService {
    pub fn new(
        engine: EngineHandle,
        faces: FaceStore,
        ledger: AttendanceLedger,
        kiosk: bool,
        match_tolerance: f32,
    ) -> Self {
        Self {
            engine,
            faces,
            ledger,
            kiosk,
            match_tolerance,
        }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Register a face for the given identity from an uploaded image.
    /// Returns the number of embeddings stored.
    async fn register_face(&self, identity: &str, image: Vec<u8>) -> fdo::Result<u32> {
        tracing::info!(identity, bytes = image.len(), "register_face requested");
        match self.engine.register(identity.to_string(), image).await {
            Ok(count) => Ok(count as u32),
            Err(e) => Err(map_engine_error(e)),
        }
    }

    /// Capture one frame and attempt to match and mark whoever is in it.
    /// Returns the outcome as JSON.
    async fn check_in(&self) -> fdo::Result<String> {
        tracing::info!("check_in requested");
        let outcome = self.engine.check_in().await.map_err(map_engine_error)?;
        to_json(&outcome)
    }

    /// Manually mark an enrolled identity present today, bypassing the
    /// camera. Returns `true` if a new record was inserted. Safe to race
    /// against the kiosk loop: uniqueness lives in the storage layer.
    async fn mark_now(&self, identity: &str) -> fdo::Result<bool> {
        tracing::info!(identity, "mark_now requested");
        if !self.faces.contains(identity).map_err(map_store_error)? {
            return Err(fdo::Error::InvalidArgs(format!(
                "identity {identity} has no registered face"
            )));
        }
        self.ledger.mark(identity).map_err(map_store_error)
    }

    /// All attendance records for one identity, newest first, as JSON.
    async fn attendance_for(&self, identity: &str) -> fdo::Result<String> {
        let records = self.ledger.records_for(identity).map_err(map_store_error)?;
        to_json(&serde_json::json!({
            "identity": identity,
            "attendance": records,
        }))
    }

    /// Every attendance record in the ledger as JSON.
    async fn attendance_all(&self) -> fdo::Result<String> {
        let records = self.ledger.all_records().map_err(map_store_error)?;
        to_json(&serde_json::json!({
            "count": records.len(),
            "attendance": records,
        }))
    }

    /// Month-to-date summary for one identity as JSON.
    async fn monthly_summary(&self, identity: &str) -> fdo::Result<String> {
        let today = Local::now().date_naive();
        let summary = self
            .ledger
            .monthly_summary(identity, today)
            .map_err(map_store_error)?;
        to_json(&summary)
    }

    /// Present/absent headcount for a day (`YYYY-MM-DD`) as JSON.
    async fn day_summary(&self, date: &str) -> fdo::Result<String> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| fdo::Error::InvalidArgs(format!("bad date {date:?}: {e}")))?;
        let summary = self.ledger.day_summary(date).map_err(map_store_error)?;
        to_json(&summary)
    }

    /// Daemon status information as JSON.
    async fn status(&self) -> fdo::Result<String> {
        let identities = self.faces.identity_count().map_err(map_store_error)?;
        let vectors = self.faces.vector_count().map_err(map_store_error)?;
        let records = self.ledger.record_count().map_err(map_store_error)?;
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "kiosk": self.kiosk,
            "match_tolerance": self.match_tolerance,
            "registered_identities": identities,
            "stored_embeddings": vectors,
            "attendance_records": records,
        }))
    }
}

/// Registration rejections are the caller's fault; everything else is ours.
fn map_engine_error(e: EngineError) -> fdo::Error {
    match &e {
        EngineError::Enroll(_) | EngineError::Store(StoreError::AlreadyRegistered(_)) => {
            fdo::Error::InvalidArgs(e.to_string())
        }
        _ => fdo::Error::Failed(e.to_string()),
    }
}

fn map_store_error(e: StoreError) -> fdo::Error {
    fdo::Error::Failed(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(e.to_string()))
}
