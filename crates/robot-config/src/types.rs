use serde::{Deserialize, Serialize};

/// Hardware description for one robot, loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    pub robot_type: String,
    #[serde(default)]
    pub serial_devices: Vec<SerialDevice>,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

/// A serial-attached device (arm controller, base controller).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDevice {
    /// Stable name, also used for the udev symlink (`/dev/<name>`).
    pub name: String,
    /// USB vendor id, lowercase hex without prefix.
    pub vendor_id: String,
    /// USB product id, lowercase hex without prefix.
    pub product_id: String,
    /// USB serial number; distinguishes identical adapters.
    #[serde(default)]
    pub serial: Option<String>,
    /// Baud rate the firmware expects.
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    Opencv,
    Realsense,
    Zed,
}

/// One camera stream definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub kind: CameraKind,
    /// Device index (`0`) or path (`/dev/video_top`).
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(default)]
    pub codec: Option<String>,
    /// USB identity for udev rule generation, if the camera is USB.
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
}

impl RobotConfig {
    pub fn camera(&self, name: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|camera| camera.name == name)
    }
}
