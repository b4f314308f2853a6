//! Automates installing VirtualBox Guest Additions inside a dnf-based
//! Linux guest: installs build dependencies, downloads and loop-mounts
//! the Guest Additions ISO, copies its contents, runs the bundled
//! installer, and falls back to installing kernel headers matching the
//! running kernel if the first attempt fails.

pub mod config;
pub mod exec;
pub mod installer;
pub mod iso;
pub mod packages;
pub mod system_check;
pub mod systemd;

use std::ffi::CString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

pub struct SudoUser {
    pub name: String,
    pub home: PathBuf,
}

/// Returns info about the real user behind `sudo`, if applicable.
///
/// Looks up `SUDO_USER` in the environment. Returns `None` if the variable
/// is unset, empty, or set to "root" (running `sudo` as root is a no-op).
pub fn sudo_user() -> Option<SudoUser> {
    let name = std::env::var("SUDO_USER").ok()?;
    if name.is_empty() || name == "root" {
        return None;
    }
    let c_name = CString::new(name.as_bytes()).ok()?;
    let pw = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if pw.is_null() {
        return None;
    }
    let home = unsafe { std::ffi::CStr::from_ptr((*pw).pw_dir) }
        .to_str()
        .ok()?;
    Some(SudoUser {
        name,
        home: PathBuf::from(home),
    })
}

pub fn is_privileged() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Validate a VirtualBox version string before it is used to build a
/// download URL and filesystem paths. Rejects anything that could
/// smuggle path components or option-looking arguments into the
/// commands the version parameterizes.
pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        bail!("version cannot be empty");
    }
    let first = version.as_bytes()[0];
    if !first.is_ascii_alphanumeric() {
        bail!("version must start with a letter or digit");
    }
    for ch in version.chars() {
        if !ch.is_ascii_alphanumeric() && !matches!(ch, '.' | '_' | '-') {
            bail!("version may only contain letters, digits, '.', '_', and '-'");
        }
    }
    Ok(())
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install SIGINT/SIGTERM handlers that set a flag instead of killing
/// the process, so RAII guards (mount point, downloaded ISO, work
/// directory) still run their cleanup.
pub fn install_signal_handlers() {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_interrupt as usize;
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
    }
}

/// Bail if an interrupt was received. Called inside long-running loops
/// (download, tree copy) so cancellation unwinds through the guards.
pub fn check_interrupted() -> Result<()> {
    if INTERRUPTED.load(Ordering::SeqCst) {
        bail!("interrupted");
    }
    Ok(())
}
