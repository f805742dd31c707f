use std::fmt::Write as _;

use crate::types::RobotConfig;

/// Render a udev rules file giving every configured USB device a stable
/// symlink under `/dev`.
///
/// Serial devices match on vendor/product id plus serial number when one
/// is configured. Cameras match the same way on the video4linux
/// subsystem, pinned to `ATTR{index}=="0"` so only the capture node (not
/// the metadata node) gets the symlink. Installing the file is left to
/// the operator.
pub fn render_udev_rules(config: &RobotConfig) -> String {
    let mut rules = String::new();
    let _ = writeln!(rules, "# udev rules for {} devices", config.robot_type);
    let _ = writeln!(
        rules,
        "# install to /etc/udev/rules.d/99-{}.rules and run: udevadm control --reload-rules && udevadm trigger",
        config.robot_type
    );

    for device in &config.serial_devices {
        let _ = writeln!(rules);
        let mut rule = format!(
            "SUBSYSTEM==\"tty\", ATTRS{{idVendor}}==\"{}\", ATTRS{{idProduct}}==\"{}\"",
            device.vendor_id, device.product_id
        );
        if let Some(serial) = &device.serial {
            let _ = write!(rule, ", ENV{{ID_SERIAL_SHORT}}==\"{serial}\"");
        }
        let _ = write!(rule, ", SYMLINK+=\"{}\", MODE=\"0666\"", device.name);
        let _ = writeln!(rules, "{rule}");
    }

    for camera in &config.cameras {
        let (Some(vendor_id), Some(product_id)) = (&camera.vendor_id, &camera.product_id) else {
            continue;
        };
        let _ = writeln!(rules);
        let mut rule = format!(
            "SUBSYSTEM==\"video4linux\", ATTRS{{idVendor}}==\"{vendor_id}\", ATTRS{{idProduct}}==\"{product_id}\""
        );
        if let Some(serial) = &camera.serial {
            let _ = write!(rule, ", ENV{{ID_SERIAL_SHORT}}==\"{serial}\"");
        }
        let _ = write!(
            rule,
            ", ATTR{{index}}==\"0\", SYMLINK+=\"video_{}\", MODE=\"0666\"",
            camera.name
        );
        let _ = writeln!(rules, "{rule}");
    }

    rules
}
