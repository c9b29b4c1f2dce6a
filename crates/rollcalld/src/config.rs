use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance below which a probe matches an enrolled face.
    pub match_tolerance: f32,
    /// Stricter distance used by the enrollment duplicate check.
    pub duplicate_tolerance: f32,
    /// In kiosk mode, run recognition on every Nth captured frame.
    pub frame_stride: u32,
    /// Integer downscale factor applied before recognition in kiosk mode.
    pub downscale: u32,
    /// Whether to run the continuous kiosk capture loop.
    pub kiosk: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("rollcall.db"));

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            match_tolerance: env_f32("ROLLCALL_MATCH_TOLERANCE", 0.45),
            duplicate_tolerance: env_f32("ROLLCALL_DUPLICATE_TOLERANCE", 0.45),
            frame_stride: env_u32("ROLLCALL_FRAME_STRIDE", 3).max(1),
            downscale: env_u32("ROLLCALL_DOWNSCALE", 4).max(1),
            kiosk: std::env::var("ROLLCALL_KIOSK")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("version-RFB-320.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("mbf_128.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
