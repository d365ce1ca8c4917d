//! External command execution

use anyhow::{Context, Result, bail};
use std::ffi::OsStr;
use std::process::Command;

/// Run a command to completion and capture its stdout
///
/// A non-zero exit is an error carrying the command's stderr.
pub fn run_capture<S: AsRef<OsStr>>(cmd: &str, args: &[S]) -> Result<String> {
    let rendered = render(cmd, args);
    log::debug!("Running: {rendered}");

    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {rendered}"))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{rendered} failed ({}): {}", output.status, stderr.trim())
    }
}

fn render<S: AsRef<OsStr>>(cmd: &str, args: &[S]) -> String {
    let mut parts = vec![cmd.to_string()];
    parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
    parts.join(" ")
}
