//! dnf orchestration: build dependencies, version-pinned kernel
//! headers, and pruning of superseded install-only kernel packages.

use std::process::Command;

use anyhow::Result;

use crate::exec;

/// Build and kernel packages the guest additions installer needs to
/// compile its kernel modules.
pub const REQUIRED_PACKAGES: &[&str] = &[
    "bison",
    "elfutils-libelf-devel",
    "flex",
    "gcc",
    "glibc-devel",
    "glibc-headers",
    "kernel-devel",
    "kernel-headers",
    "libxcrypt-devel",
    "libzstd-devel",
    "m4",
    "make",
    "openssl-devel",
    "zlib-devel",
];

pub fn install_build_deps(verbose: bool) -> Result<()> {
    eprintln!(
        "installing build dependencies: {}",
        REQUIRED_PACKAGES.join(", ")
    );
    let mut cmd = Command::new("dnf");
    cmd.args(["install", "-y"]).args(REQUIRED_PACKAGES);
    exec::run(&mut cmd, verbose)
}

/// Package names pinned to the running kernel release.
fn pinned_header_packages(release: &str) -> [String; 2] {
    [
        format!("kernel-devel-{release}"),
        format!("kernel-headers-{release}"),
    ]
}

/// Install kernel-devel and kernel-headers matching the given kernel
/// release exactly. Fallback path only: the unpinned packages installed
/// with the build dependencies may be newer than the running kernel.
pub fn install_kernel_headers(release: &str, verbose: bool) -> Result<()> {
    eprintln!("installing kernel headers for {release}");
    let mut cmd = Command::new("dnf");
    cmd.args(["install", "-y"]).args(pinned_header_packages(release));
    exec::run(&mut cmd, verbose)
}

/// Parse `dnf repoquery -q` output into package names, one per line.
fn parse_repoquery(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Remove all but the newest set of install-only kernel packages, so
/// the pinned headers installed for the running kernel are the ones the
/// installer's module build finds.
pub fn prune_old_kernels(verbose: bool) -> Result<()> {
    eprintln!("removing superseded kernel packages");
    let mut query = Command::new("dnf");
    query.args(["repoquery", "--installonly", "--latest-limit=-1", "-q"]);
    let output = exec::run_capture(&mut query, verbose)?;

    let old = parse_repoquery(&output);
    if old.is_empty() {
        eprintln!("no superseded kernel packages to remove");
        return Ok(());
    }

    let mut remove = Command::new("dnf");
    remove.args(["remove", "-y"]).args(&old);
    exec::run(&mut remove, verbose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_header_packages() {
        let [devel, headers] = pinned_header_packages("6.8.9-300.fc40.x86_64");
        assert_eq!(devel, "kernel-devel-6.8.9-300.fc40.x86_64");
        assert_eq!(headers, "kernel-headers-6.8.9-300.fc40.x86_64");
    }

    #[test]
    fn test_parse_repoquery_empty() {
        assert!(parse_repoquery("").is_empty());
        assert!(parse_repoquery("\n\n  \n").is_empty());
    }

    #[test]
    fn test_parse_repoquery_packages() {
        let output = "kernel-core-6.8.7-300.fc40.x86_64\n\
                      kernel-devel-6.8.7-300.fc40.x86_64\n";
        assert_eq!(
            parse_repoquery(output),
            vec![
                "kernel-core-6.8.7-300.fc40.x86_64",
                "kernel-devel-6.8.7-300.fc40.x86_64",
            ]
        );
    }

    #[test]
    fn test_parse_repoquery_trims_whitespace() {
        assert_eq!(parse_repoquery("  pkg-1.0  \n"), vec!["pkg-1.0"]);
    }
}
