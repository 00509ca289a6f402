// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 focus controls
//!
//! Raw `VIDIOC_*` ioctls for the two focus controls the recorder needs:
//! continuous auto-focus (`FOCUS_AUTO`) and a one-shot focus sweep
//! (`AUTO_FOCUS_START`).

use crate::backends::camera::FocusControl;
use crate::errors::{CameraError, CameraResult};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

/// Continuous auto focus enable
pub const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;
/// One-shot auto focus (button control)
pub const V4L2_CID_AUTO_FOCUS_START: u32 = V4L2_CID_CAMERA_CLASS_BASE + 28;

const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// (dir << 30) | (size << 16) | ('V' << 8) | nr
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Whether the device exposes an enabled control with this id
pub fn has_control(device_path: &str, control_id: u32) -> bool {
    let Ok(file) = File::open(device_path) else {
        return false;
    };
    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            VIDIOC_QUERYCTRL,
            &mut qctrl as *mut V4l2Queryctrl,
        )
    };
    result >= 0 && qctrl.flags & V4L2_CTRL_FLAG_DISABLED == 0
}

pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result =
        unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }
    Some(ctrl.value)
}

pub fn set_control(device_path: &str, control_id: u32, value: i32) -> CameraResult<()> {
    let file = File::open(device_path)
        .map_err(|e| CameraError::Backend(format!("Failed to open {}: {}", device_path, e)))?;
    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result =
        unsafe { libc::ioctl(file.as_raw_fd(), VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(device_path, control_id, value, ?errno, "Failed to set V4L2 control");
        return Err(CameraError::ParameterRejected(format!(
            "control {:#x}={}: {}",
            control_id, value, errno
        )));
    }
    Ok(())
}

/// Focus trigger bound to a V4L2 device node
pub struct V4l2Focus {
    device_path: String,
}

impl V4l2Focus {
    /// `None` when the device cannot run a focus sweep
    pub fn probe(device_path: &str) -> Option<Self> {
        has_control(device_path, V4L2_CID_AUTO_FOCUS_START).then(|| Self {
            device_path: device_path.to_string(),
        })
    }
}

impl FocusControl for V4l2Focus {
    fn trigger_auto_focus(&self) -> CameraResult<()> {
        set_control(&self.device_path, V4L2_CID_AUTO_FOCUS_START, 1)
    }
}
