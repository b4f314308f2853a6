//! Thin wrappers around [`std::process::Command`] for the external
//! tools this program orchestrates (dnf, mount, umount, the extracted
//! installer).
//!
//! Commands are always built as structured argument lists; nothing here
//! goes through a shell. `run` treats a nonzero exit as fatal, which is
//! the default for every step of the install flow; `run_unchecked` is
//! for the one caller (the installer itself) that wants to inspect the
//! status instead.

use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};

/// Render a command for verbose echo and error messages.
pub fn render(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

/// Run a command to completion, inheriting stdio. Nonzero exit is an
/// error; the caller propagates it and the process exits 1.
pub fn run(cmd: &mut Command, verbose: bool) -> Result<()> {
    let status = run_unchecked(cmd, verbose)?;
    if !status.success() {
        bail!(
            "command failed (exit {}): {}",
            status.code().unwrap_or(-1),
            render(cmd)
        );
    }
    Ok(())
}

/// Run a command to completion and hand back its exit status. Failing
/// to spawn at all is still an error.
pub fn run_unchecked(cmd: &mut Command, verbose: bool) -> Result<ExitStatus> {
    if verbose {
        eprintln!("exec: {}", render(cmd));
    }
    cmd.status()
        .with_context(|| format!("failed to run {}", render(cmd)))
}

/// Run a command and capture its stdout as UTF-8. Stderr is inherited
/// so diagnostics from the tool still reach the terminal.
pub fn run_capture(cmd: &mut Command, verbose: bool) -> Result<String> {
    if verbose {
        eprintln!("exec: {}", render(cmd));
    }
    let output = cmd
        .stderr(std::process::Stdio::inherit())
        .output()
        .with_context(|| format!("failed to run {}", render(cmd)))?;
    if !output.status.success() {
        bail!(
            "command failed (exit {}): {}",
            output.status.code().unwrap_or(-1),
            render(cmd)
        );
    }
    String::from_utf8(output.stdout)
        .with_context(|| format!("output of {} is not valid UTF-8", render(cmd)))
}
