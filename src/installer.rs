//! Running the bundled `VBoxLinuxAdditions.run` installer, including
//! the retry-with-kernel-headers fallback.
//!
//! The installer builds kernel modules against the headers it finds,
//! which must match the running kernel exactly. On a fresh guest the
//! installed headers are often newer than the booted kernel, so a
//! failed first attempt triggers one remediation: install headers
//! pinned to `uname -r`, prune superseded kernel packages, retry once.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};

use crate::{exec, packages, system_check};

pub const INSTALLER_NAME: &str = "VBoxLinuxAdditions.run";

/// Outcome of one installer attempt. Distinguishing a missing binary
/// from a failed run lets the orchestrator decide which failures are
/// worth the kernel-headers fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Success,
    /// The extracted tree has no installer binary. Retrying cannot
    /// help; the ISO contents are wrong for this platform.
    BinaryMissing,
    /// The installer ran and reported failure.
    InstallFailed,
}

/// Run the extracted installer once and classify the result. Only a
/// failure to spawn an existing binary is an error.
pub fn run_installer(work_dir: &Path, verbose: bool) -> Result<InstallOutcome> {
    let installer = work_dir.join(INSTALLER_NAME);
    if !installer.is_file() {
        return Ok(InstallOutcome::BinaryMissing);
    }
    eprintln!("running {}", installer.display());
    let status = exec::run_unchecked(&mut Command::new(&installer), verbose)?;
    if status.success() {
        Ok(InstallOutcome::Success)
    } else {
        Ok(InstallOutcome::InstallFailed)
    }
}

/// Install guest additions, falling back to version-pinned kernel
/// headers on a failed first attempt. The second failure is final.
pub fn install_with_fallback(work_dir: &Path, verbose: bool) -> Result<()> {
    eprintln!("attempting to install guest additions with existing kernel headers");
    match run_installer(work_dir, verbose)? {
        InstallOutcome::Success => return Ok(()),
        InstallOutcome::BinaryMissing => {
            bail!("{INSTALLER_NAME} not found in {}", work_dir.display())
        }
        InstallOutcome::InstallFailed => {}
    }

    let release = system_check::kernel_release()?;
    eprintln!("install failed with existing headers; installing headers for kernel {release}");
    packages::install_kernel_headers(&release, verbose)?;
    packages::prune_old_kernels(verbose)?;

    eprintln!("retrying guest additions install with kernel {release} headers");
    match run_installer(work_dir, verbose)? {
        InstallOutcome::Success => Ok(()),
        InstallOutcome::BinaryMissing => {
            bail!("{INSTALLER_NAME} not found in {}", work_dir.display())
        }
        InstallOutcome::InstallFailed => {
            bail!("guest additions install failed with kernel {release} headers")
        }
    }
}
