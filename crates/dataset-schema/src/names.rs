//! Fixed naming tables for the v2.1 → v3.0 schema upgrade.

/// Arm joint names shared by the action and observation.state vectors
/// in both schema versions (12 dimensions, left arm then right arm).
pub const ARM_JOINT_NAMES: [&str; 12] = [
    "left_shoulder_pan.pos",
    "left_shoulder_lift.pos",
    "left_elbow_flex.pos",
    "left_wrist_flex.pos",
    "left_wrist_roll.pos",
    "left_gripper.pos",
    "right_shoulder_pan.pos",
    "right_shoulder_lift.pos",
    "right_elbow_flex.pos",
    "right_wrist_flex.pos",
    "right_wrist_roll.pos",
    "right_gripper.pos",
];

/// Base velocity dimensions appended to the action vector in v3.0.
pub const BASE_ACTION_NAMES: [&str; 3] = ["base_vx", "base_vy", "base_omega"];

/// Base pose dimensions appended to the observation.state vector in v3.0.
pub const BASE_STATE_NAMES: [&str; 3] = ["base_x", "base_y", "base_theta"];

/// Number of zero-filled dimensions added per vector during expansion.
pub const BASE_DIMS: usize = 3;

/// Storage-key prefix shared by all camera stream features.
pub const IMAGE_KEY_PREFIX: &str = "observation.images.";

/// Camera stream renames applied during the upgrade (old name, new name).
pub const CAMERA_RENAMES: [(&str, &str); 3] = [
    ("wrist_right", "right_wrist"),
    ("wrist_left", "left_wrist"),
    ("realsense_top", "top"),
];

/// Camera whose frames are re-encoded with black letterbox bars.
pub const LETTERBOX_CAMERA: &str = "top";
pub const LETTERBOX_WIDTH: u32 = 1280;
pub const LETTERBOX_HEIGHT: u32 = 720;

/// Camera synthesized as all-black frames when absent from the source.
pub const SYNTHETIC_CAMERA: &str = "front";
pub const SYNTHETIC_WIDTH: u32 = 640;
pub const SYNTHETIC_HEIGHT: u32 = 480;
pub const SYNTHETIC_FPS: u32 = 30;

/// Robot type tag written into converted datasets.
pub const TARGET_ROBOT_TYPE: &str = "mimic_follower";

/// 15-dimension action names for a converted dataset.
pub fn v30_action_names() -> Vec<String> {
    ARM_JOINT_NAMES
        .iter()
        .chain(BASE_ACTION_NAMES.iter())
        .map(|s| s.to_string())
        .collect()
}

/// 15-dimension observation.state names for a converted dataset.
pub fn v30_state_names() -> Vec<String> {
    ARM_JOINT_NAMES
        .iter()
        .chain(BASE_STATE_NAMES.iter())
        .map(|s| s.to_string())
        .collect()
}

/// Map a source camera name to its target name, if it is renamed.
pub fn renamed_camera(old: &str) -> Option<&'static str> {
    CAMERA_RENAMES
        .iter()
        .find(|(from, _)| *from == old)
        .map(|(_, to)| *to)
}

/// Full storage key for a camera stream, e.g. `observation.images.top`.
pub fn image_key(camera: &str) -> String {
    format!("{IMAGE_KEY_PREFIX}{camera}")
}
