// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the recorder
//!
//! This module provides command-line functionality for:
//! - Listing available cameras and flash LEDs
//! - Recording a take with live pause/resume/stop/cancel/torch control
//! - Showing the effective configuration

use crate::{FacingArg, RecordArgs};
use camera_recorder::backends::camera::{
    CameraBackend, CameraFacing, CameraInfo, FrontLightMode, SurfaceTarget,
};
use camera_recorder::backends::virtual_camera::{
    CallJournal, VirtualCameraBackend, VirtualEncoderFactory,
};
use camera_recorder::config::{CaptureConfig, Config};
use camera_recorder::constants::{BITS_PER_KILOBIT, format_bitrate};
use camera_recorder::errors::{RecordingError, RecordingResult};
use camera_recorder::flash::FlashHardware;
use camera_recorder::pipelines::video::{
    EncoderFactory, Recorder, RecorderEvent, RecorderState, format_duration,
};
use camera_recorder::storage;
use chrono::Local;
use std::io::Write;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn camera_backend(virtual_camera: bool) -> CliResult<Box<dyn CameraBackend>> {
    if virtual_camera {
        return Ok(Box::new(VirtualCameraBackend::new(CallJournal::new())));
    }
    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(
            camera_recorder::backends::camera::v4l2::V4l2Backend::new()?,
        ))
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        Err("built without GStreamer support; pass --virtual or rebuild with --features gstreamer".into())
    }
}

fn encoder_factory(virtual_camera: bool) -> CliResult<Box<dyn EncoderFactory>> {
    if virtual_camera {
        return Ok(Box::new(VirtualEncoderFactory::new(CallJournal::new())));
    }
    #[cfg(feature = "gstreamer")]
    {
        Ok(Box::new(
            camera_recorder::pipelines::video::gst_encoder::GstEncoderFactory::new()?,
        ))
    }
    #[cfg(not(feature = "gstreamer"))]
    {
        Err("built without GStreamer support; pass --virtual or rebuild with --features gstreamer".into())
    }
}

/// List all available cameras
pub fn list_cameras(virtual_camera: bool) -> CliResult<()> {
    let mut backend = camera_backend(virtual_camera)?;
    let cameras = backend.enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
    } else {
        println!("Available cameras ({}):", backend.backend_name());
        println!();
        for camera in &cameras {
            println!("  [{}] {}", camera.index, camera.name);
            println!(
                "      Facing: {}, sensor rotation: {}",
                camera.facing, camera.orientation
            );
            if let Some(path) = &camera.path {
                println!("      Device: {}", path);
            }
            if let Some(sizes) = preview_sizes(backend.as_mut(), camera) {
                println!("      Preview sizes: {}", sizes);
            }
            println!();
        }
    }

    println!();
    let flash = FlashHardware::detect();
    if flash.has_devices() {
        let names: Vec<&str> = flash.devices.iter().map(|d| d.name()).collect();
        println!("Flash LEDs: {}", names.join(", "));
    } else if let Some(msg) = &flash.permission_error {
        println!("{}", msg);
    } else {
        println!("No flash LEDs found.");
    }

    Ok(())
}

/// Open the camera briefly to read its preview sizes (largest first, top 4)
fn preview_sizes(backend: &mut dyn CameraBackend, camera: &CameraInfo) -> Option<String> {
    let mut device = backend.open(camera).ok()?;
    let params = device.parameters();
    device.release();

    let mut sizes = params.ok()?.supported_preview_sizes;
    if sizes.is_empty() {
        return None;
    }
    sizes.sort_by(|a, b| b.area().cmp(&a.area()));
    let shown: Vec<String> = sizes.iter().take(4).map(|s| s.to_string()).collect();
    Some(shown.join(", "))
}

/// Print the effective configuration
pub fn show_config() -> CliResult<()> {
    match Config::path() {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (no config directory)"),
    }
    let config = Config::load();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

fn apply_args(config: &mut Config, args: &RecordArgs) {
    if let Some(min) = args.min {
        config.min_duration_ms = seconds_to_ms(min);
    }
    if let Some(max) = args.max {
        config.max_duration_ms = seconds_to_ms(max);
    }
    if let Some(width) = args.width {
        config.video_width = width;
    }
    if let Some(height) = args.height {
        config.video_height = height;
    }
    if let Some(fps) = args.fps {
        config.frame_rate = fps;
    }
    if let Some(kbps) = args.bitrate {
        config.bit_rate_kbps = Some(kbps);
    }
    if let Some(facing) = args.facing {
        config.facing = match facing {
            FacingArg::Back => CameraFacing::Back,
            FacingArg::Front => CameraFacing::Front,
        };
    }
    if args.camera.is_some() {
        config.camera_index = args.camera;
    }
    if let Some(dir) = &args.output {
        config.output_dir = Some(dir.clone());
    }
    if let Some(name) = &args.name {
        config.base_name = name.clone();
    }
    if args.timestamp {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        config.base_name = format!("{}_{}", config.base_name, stamp);
    }
    if args.torch {
        config.front_light_mode = FrontLightMode::On;
    }
    config.auto_open = true;
}

/// Commands accepted while a take runs
enum Control {
    Interrupt,
    Line(String),
}

/// Record a video
pub fn record_video(args: RecordArgs) -> CliResult<()> {
    let mut config = Config::load();
    apply_args(&mut config, &args);
    let capture = config.capture_config()?;
    println!(
        "Format: {}x{} @ {}fps, {}",
        capture.target.width,
        capture.target.height,
        capture.target.frame_rate,
        format_bitrate(capture.target.bit_rate / BITS_PER_KILOBIT)
    );

    let camera = camera_backend(args.virtual_camera)?;
    let encoders = encoder_factory(args.virtual_camera)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run_take(camera, encoders, capture));
    // The stdin reader blocks a runtime thread until the next line
    runtime.shutdown_background();
    result
}

async fn run_take(
    camera: Box<dyn CameraBackend>,
    encoders: Box<dyn EncoderFactory>,
    capture: CaptureConfig,
) -> CliResult<()> {
    let recorder = Recorder::new(camera, encoders, capture)?;
    let mut events = recorder.subscribe();

    recorder.surface_available(SurfaceTarget::Headless)?;
    if !recorder.is_camera_open() {
        return Err("camera could not be opened".into());
    }
    if let Some(handle) = recorder.camera_handle() {
        println!("Using camera: {}", handle);
    }

    // Ctrl+C and stdin both feed one channel
    let (control_tx, mut control_rx) = mpsc::unbounded_channel();
    let interrupt_tx = control_tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Control::Interrupt);
    })?;
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if control_tx.send(Control::Line(line)).is_err() {
                break;
            }
        }
    });

    let policy = recorder.duration_policy();
    let path = recorder.start()?;
    println!("Recording to {}", path.display());
    if policy.max_ms() > 0 {
        println!("Stops automatically at {}", format_duration(policy.max_ms()));
    }
    println!("Commands: p=pause r=resume s=stop c=cancel t=torch (Ctrl+C stops)");

    let mut interrupts = 0u32;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if report(event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
            Some(control) = control_rx.recv() => match control {
                Control::Interrupt => {
                    interrupts += 1;
                    if interrupts == 1 {
                        println!();
                        println!("Stopping... (Ctrl+C again to discard)");
                        stop(&recorder)?;
                    } else {
                        recorder.cancel();
                    }
                }
                Control::Line(line) => command(&recorder, line.trim()),
            },
        }
    }

    recorder.close_camera();
    Ok(())
}

fn stop(recorder: &Recorder) -> RecordingResult<()> {
    match recorder.stop() {
        Ok(_) => Ok(()),
        // Reported through the TooShort/Cancelled events
        Err(RecordingError::DurationTooShort { .. }) => Ok(()),
        Err(RecordingError::InvalidState { .. }) if recorder.state() == RecorderState::Prepared => {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn command(recorder: &Recorder, line: &str) {
    let result = match line {
        "p" | "pause" => recorder.pause(),
        "r" | "resume" => recorder.resume(),
        "s" | "stop" => stop(recorder),
        "c" | "cancel" => {
            recorder.cancel();
            Ok(())
        }
        "t" | "torch" => {
            if !recorder.torch_available() {
                println!("\nNo torch on this camera");
                return;
            }
            recorder.set_torch(!recorder.torch_state())
        }
        "" => Ok(()),
        other => {
            println!("\nUnknown command '{}'", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        println!("\n{}", e);
    }
}

/// Print one event; true once the take is over
fn report(event: RecorderEvent) -> bool {
    match event {
        RecorderEvent::Started { .. } => false,
        RecorderEvent::Tick {
            elapsed_ms,
            percent,
        } => {
            print!("\rRecording: {} ({:>3}%)", format_duration(elapsed_ms), percent);
            let _ = std::io::stdout().flush();
            false
        }
        RecorderEvent::Paused { elapsed_ms } => {
            println!("\rPaused at {}          ", format_duration(elapsed_ms));
            false
        }
        RecorderEvent::Resumed => {
            println!("Resumed");
            false
        }
        RecorderEvent::TooShort { elapsed_ms, min_ms } => {
            println!(
                "\nTake too short ({} < {}), discarding",
                format_duration(elapsed_ms),
                format_duration(min_ms)
            );
            false
        }
        RecorderEvent::CameraError(msg) => {
            eprintln!("\nCamera error: {}", msg);
            false
        }
        RecorderEvent::Stopped {
            duration_ms,
            path,
            segments,
        } => {
            println!();
            println!(
                "Saved {} ({}, {} bytes)",
                path.display(),
                format_duration(duration_ms),
                storage::file_size(&path)
            );
            for extra in segments.iter().skip(1) {
                println!("  segment: {}", extra.display());
            }
            true
        }
        RecorderEvent::Cancelled { reason } => {
            println!();
            println!("Recording discarded ({:?})", reason);
            true
        }
    }
}
