// SPDX-License-Identifier: GPL-3.0-only

//! Torch LED control via Linux sysfs
//!
//! Discovers flash LEDs exposed at `/sys/class/leds/*:flash` and drives them
//! in torch mode through the `brightness` file, which is group-writable by
//! `feedbackd` on most phones. The root-only strobe interface is never used.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default sysfs LED class directory
pub const SYSFS_LEDS: &str = "/sys/class/leds";

/// A flash LED device discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    /// Maximum brightness value (from `max_brightness` file)
    max_brightness: u32,
    /// Human-readable name (directory basename)
    name: String,
}

impl FlashDevice {
    /// Get the device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    /// Current raw brightness
    pub fn brightness(&self) -> io::Result<u32> {
        let text = std::fs::read_to_string(self.path.join("brightness"))?;
        text.trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Turn off the LED
    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }
}

/// Result of hardware flash detection.
///
/// Separates "hardware exists" from "we can control it" so callers can show
/// a helpful permission error instead of silently hiding the torch.
#[derive(Debug, Clone, Default)]
pub struct FlashHardware {
    /// Devices we can actually control (writable)
    pub devices: Vec<FlashDevice>,
    /// User-facing error if hardware was found but not writable
    pub permission_error: Option<String>,
}

impl FlashHardware {
    /// Scan `/sys/class/leds/` for `*:flash` entries.
    pub fn detect() -> FlashHardware {
        Self::detect_in(Path::new(SYSFS_LEDS))
    }

    /// Scan an LED class directory for `*:flash` entries.
    ///
    /// Always detects hardware presence. If LEDs exist but the brightness
    /// file is not writable, builds a user-friendly error message with
    /// the correct privilege escalation command and group name.
    pub fn detect_in(leds_dir: &Path) -> FlashHardware {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            warn!(path = %leds_dir.display(), "Cannot read LED class directory, flash discovery skipped");
            return FlashHardware::default();
        };

        let mut devices = Vec::new();
        let mut permission_failures: Vec<(String, PathBuf)> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            // Match entries like "white:flash", "yellow:flash"
            if !name_str.ends_with(":flash") {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let max_brightness_path = led_path.join("max_brightness");

            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(
                            path = %max_brightness_path.display(),
                            "Invalid max_brightness value"
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            // Attempt write access
            match std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered flash LED");
                    devices.push(FlashDevice {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        path = %brightness_path.display(),
                        "Flash LED found but not writable"
                    );
                    permission_failures.push((name_str.to_string(), brightness_path));
                }
            }
        }

        // Deterministic ordering (white before yellow)
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        let permission_error = if !permission_failures.is_empty() && devices.is_empty() {
            Some(Self::build_permission_error(&permission_failures))
        } else {
            None
        };

        FlashHardware {
            devices,
            permission_error,
        }
    }

    /// Whether any controllable flash devices were found
    pub fn has_devices(&self) -> bool {
        !self.devices.is_empty()
    }

    /// Build a user-friendly permission error message.
    ///
    /// Detects the current username, the required group from file
    /// ownership, and whether `doas` or `sudo` is available.
    fn build_permission_error(failures: &[(String, PathBuf)]) -> String {
        let username = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

        let escalation_tool = if Path::new("/usr/bin/doas").exists() {
            "doas"
        } else {
            "sudo"
        };

        let group = failures
            .first()
            .and_then(|(_, path)| {
                let gid = std::fs::metadata(path).ok()?.gid();
                // Resolve GID to group name by reading /etc/group
                let group_contents = std::fs::read_to_string("/etc/group").ok()?;
                group_contents.lines().find_map(|line| {
                    let parts: Vec<&str> = line.split(':').collect();
                    (parts.len() >= 3 && parts[2].parse::<u32>().ok() == Some(gid))
                        .then(|| parts[0].to_string())
                })
            })
            .unwrap_or_else(|| "feedbackd".to_string());

        format!(
            "Flash LEDs detected but cannot be controlled.\n\n\
             Run: {escalation_tool} adduser {username} {group}\n\n\
             Then log out and back in."
        )
    }
}

/// Torch made of every discovered flash LED
#[derive(Debug, Clone, Default)]
pub struct Torch {
    devices: Vec<FlashDevice>,
}

impl Torch {
    pub fn new(devices: Vec<FlashDevice>) -> Self {
        Self { devices }
    }

    pub fn is_available(&self) -> bool {
        !self.devices.is_empty()
    }

    /// Light or darken all LEDs; fails if any LED refused
    pub fn set(&self, on: bool) -> io::Result<()> {
        let mut result = Ok(());
        for dev in &self.devices {
            let r = if on { dev.torch(1.0) } else { dev.off() };
            if let Err(e) = r {
                warn!(device = %dev.name, error = %e, on, "Failed to switch flash LED");
                result = Err(e);
            }
        }
        result
    }

    /// Lit when any LED has a non-zero brightness
    pub fn is_on(&self) -> bool {
        self.devices
            .iter()
            .any(|dev| dev.brightness().map(|b| b > 0).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_led(root: &Path, name: &str, max: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("max_brightness"), max).unwrap();
        std::fs::write(dir.join("brightness"), "0").unwrap();
    }

    #[test]
    fn test_detects_only_flash_entries() {
        let root = tempfile::tempdir().unwrap();
        fake_led(root.path(), "yellow:flash", "255\n");
        fake_led(root.path(), "white:flash", "100\n");
        fake_led(root.path(), "green:status", "1\n");
        fake_led(root.path(), "red:flash", "0\n");

        let hw = FlashHardware::detect_in(root.path());
        let names: Vec<&str> = hw.devices.iter().map(|d| d.name()).collect();
        assert_eq!(names, ["white:flash", "yellow:flash"]);
        assert!(hw.permission_error.is_none());
    }

    #[test]
    fn test_torch_switches_all_leds() {
        let root = tempfile::tempdir().unwrap();
        fake_led(root.path(), "white:flash", "100");
        let torch = Torch::new(FlashHardware::detect_in(root.path()).devices);

        assert!(!torch.is_on());
        torch.set(true).unwrap();
        assert!(torch.is_on());
        assert_eq!(
            std::fs::read_to_string(root.path().join("white:flash/brightness")).unwrap(),
            "100"
        );
        torch.set(false).unwrap();
        assert!(!torch.is_on());
    }

    #[test]
    fn test_missing_directory() {
        let hw = FlashHardware::detect_in(Path::new("/nonexistent/leds"));
        assert!(!hw.has_devices());
    }
}
