// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMERA_RECORDER_VERSION");

    // Packagers can pin the version string instead of relying on git
    let version = std::env::var("CAMERA_RECORDER_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(describe_version);

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version string derived from `git describe`.
///
/// - exact tag `v0.2.0` becomes `0.2.0-<hash>`
/// - `v0.2.0-4-gabc1234` becomes `0.2.0-dirty-abc1234`
/// - no git at all falls back to the crate version
fn describe_version() -> String {
    let Some(described) = git(&["describe", "--tags", "--always", "--match", "v*"]) else {
        return env_crate_version();
    };
    let described = described.strip_prefix('v').unwrap_or(&described).to_string();

    let mut parts = described.rsplitn(3, '-');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(hash), Some(_commits), Some(base)) => {
            let hash = hash.strip_prefix('g').unwrap_or(hash);
            format!("{}-dirty-{}", base, hash)
        }
        _ => {
            let hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".into());
            if described == hash {
                // No tag yet, describe --always returned the bare hash
                format!("{}-{}", env_crate_version(), hash)
            } else {
                format!("{}-{}", described, hash)
            }
        }
    }
}

fn env_crate_version() -> String {
    std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string())
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
