use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod recency;

use config::Config;
use dbus_interface::AttendanceService;
use rollcall_store::Database;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    let database = Database::open(&config.db_path)?;

    let stop = Arc::new(AtomicBool::new(false));
    let engine = engine::spawn_engine(&config, &database, stop.clone())?;

    let service = AttendanceService::new(
        engine,
        database.face_store(),
        database.ledger(),
        config.kiosk,
        config.match_tolerance,
    );

    let _connection = zbus::connection::Builder::session()?
        .name("org.rollcall.Attendance1")?
        .serve_at("/org/rollcall/Attendance1", service)?
        .build()
        .await?;

    tracing::info!("rollcalld ready");

    // Keep running until signaled; the stop flag is observed by the kiosk
    // loop between iterations.
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");
    stop.store(true, Ordering::Relaxed);

    Ok(())
}
