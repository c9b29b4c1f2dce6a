use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use zbus::proxy;

#[proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn register_face(&self, identity: &str, image: Vec<u8>) -> zbus::Result<u32>;
    fn check_in(&self) -> zbus::Result<String>;
    fn mark_now(&self, identity: &str) -> zbus::Result<bool>;
    fn attendance_for(&self, identity: &str) -> zbus::Result<String>;
    fn attendance_all(&self) -> zbus::Result<String>;
    fn monthly_summary(&self, identity: &str) -> zbus::Result<String>;
    fn day_summary(&self, date: &str) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face for an identity from an image file
    Register {
        /// Identity key (roll number / employee id)
        identity: String,
        /// Path to a JPEG/PNG image containing exactly one face
        image: PathBuf,
    },
    /// Capture one frame and mark whoever is recognized in it
    CheckIn,
    /// Manually mark an identity present today (no camera)
    Mark {
        identity: String,
    },
    /// Show attendance records for an identity
    Attendance {
        identity: String,
    },
    /// Show every attendance record
    All,
    /// Show the month-to-date summary for an identity
    Summary {
        identity: String,
    },
    /// Show the present/absent headcount for a day
    Day {
        /// Date as YYYY-MM-DD
        date: String,
    },
    /// Show daemon status
    Status,
    /// Run camera diagnostics (bypasses the daemon)
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Test = cli.command {
        return run_camera_test();
    }

    let connection = zbus::Connection::session()
        .await
        .context("cannot connect to the session bus — is rollcalld running?")?;
    let daemon = AttendanceProxy::new(&connection).await?;

    match cli.command {
        Commands::Register { identity, image } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("cannot read image {}", image.display()))?;
            let count = daemon.register_face(&identity, bytes).await?;
            println!("Registered {identity}: {count} embedding(s) stored");
        }
        Commands::CheckIn => {
            print_json(&daemon.check_in().await?)?;
        }
        Commands::Mark { identity } => {
            if daemon.mark_now(&identity).await? {
                println!("Attendance marked for {identity}");
            } else {
                println!("{identity} was already marked today");
            }
        }
        Commands::Attendance { identity } => {
            print_json(&daemon.attendance_for(&identity).await?)?;
        }
        Commands::All => {
            print_json(&daemon.attendance_all().await?)?;
        }
        Commands::Summary { identity } => {
            print_json(&daemon.monthly_summary(&identity).await?)?;
        }
        Commands::Day { date } => {
            print_json(&daemon.day_summary(&date).await?)?;
        }
        Commands::Status => {
            print_json(&daemon.status().await?)?;
        }
        Commands::Test => unreachable!("handled above"),
    }

    Ok(())
}

/// Re-indent a JSON payload from the daemon for the terminal.
fn print_json(payload: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Direct camera diagnostics: list devices, open the configured one, and
/// capture a single frame.
fn run_camera_test() -> Result<()> {
    let devices = rollcall_hw::Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return Ok(());
    }

    println!("Capture devices:");
    for dev in &devices {
        println!("  {}  {} ({})", dev.path, dev.name, dev.driver);
    }

    let device = std::env::var("ROLLCALL_CAMERA_DEVICE")
        .unwrap_or_else(|_| "/dev/video0".to_string());
    println!("\nOpening {device}...");

    let camera = rollcall_hw::Camera::open(&device)?;
    println!(
        "Negotiated {}x{} {:?}",
        camera.width, camera.height, camera.fourcc
    );

    let frame = camera.capture_frame()?;
    println!(
        "Captured frame: {}x{}, {} bytes, sequence {}",
        frame.width,
        frame.height,
        frame.data.len(),
        frame.sequence
    );

    Ok(())
}
