use std::fs;
use std::path::Path;

use anyhow::Context;
use serde_yaml::Value;

use crate::types::RobotConfig;

pub fn load_robot_config(path: impl AsRef<Path>) -> anyhow::Result<RobotConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading robot config: {}", path.display()))?;
    let val: Value =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    let config: RobotConfig = serde_yaml::from_value(val)
        .with_context(|| format!("decoding robot config: {}", path.display()))?;
    Ok(config)
}
