//! rollcall-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access with YUYV/MJPG to RGB conversion and
//! the downscaling used by the recognition loop.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::Frame;
