//! Host environment checks: required external tools and the running
//! kernel release (used to pin kernel header packages on the fallback
//! path).

use std::path::PathBuf;

use anyhow::{bail, Result};

/// Find a program in PATH, returning its full path.
pub fn find_program(name: &str) -> Result<PathBuf> {
    let path_var = std::env::var("PATH").unwrap_or_default();
    for dir in path_var.split(':') {
        let candidate = PathBuf::from(dir).join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!("{name} not found in PATH")
}

/// Check that the listed tools are available before doing any work.
///
/// Each entry is `(program, install_hint)`. Fails with the full list of
/// missing tools rather than stopping at the first.
pub fn check_dependencies(tools: &[(&str, &str)], verbose: bool) -> Result<()> {
    let mut missing = Vec::new();
    for (tool, hint) in tools {
        match find_program(tool) {
            Ok(path) => {
                if verbose {
                    eprintln!("found {tool}: {}", path.display());
                }
            }
            Err(_) => missing.push((*tool, *hint)),
        }
    }
    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, h)| format!("  {t} (install: {h})"))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("missing required tools:\n{msg}");
    }
    Ok(())
}

/// Read the running kernel release string (e.g. "6.8.9-300.fc40.x86_64")
/// via uname(2). Guest additions kernel modules must be built against
/// headers matching exactly this release.
pub fn kernel_release() -> Result<String> {
    let mut utsname: libc::utsname = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::uname(&mut utsname) };
    if ret != 0 {
        bail!("uname() failed");
    }
    let release = unsafe { std::ffi::CStr::from_ptr(utsname.release.as_ptr()) }
        .to_str()
        .map_err(|_| anyhow::anyhow!("kernel release is not valid UTF-8"))?;
    if release.is_empty() {
        bail!("uname() returned an empty kernel release");
    }
    Ok(release.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_program_exists() {
        // 'sh' exists on any Unix system.
        assert!(find_program("sh").is_ok());
    }

    #[test]
    fn test_find_program_missing() {
        assert!(find_program("definitely-not-a-real-program-42").is_err());
    }

    #[test]
    fn test_check_dependencies_ok() {
        let tools = &[("sh", "coreutils"), ("ls", "coreutils")];
        assert!(check_dependencies(tools, false).is_ok());
    }

    #[test]
    fn test_check_dependencies_missing_lists_hint() {
        let tools = &[("definitely-not-a-real-program-42", "fake-package")];
        let err = check_dependencies(tools, false).unwrap_err();
        assert!(format!("{err}").contains("fake-package"));
    }

    #[test]
    fn test_kernel_release() {
        let release = kernel_release().unwrap();
        assert!(!release.is_empty());
        assert!(release.contains('.'));
    }
}
