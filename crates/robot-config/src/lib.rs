//! robot-config: robot hardware descriptors
//!
//! Loads the hardware YAML describing serial devices (arm ports) and
//! cameras, and renders udev rules that give each USB device a stable
//! symlink name across replugs and reboots.

mod types;
pub use types::{CameraConfig, CameraKind, RobotConfig, SerialDevice};

mod loader;
pub use loader::load_robot_config;

mod udev;
pub use udev::render_udev_rules;
