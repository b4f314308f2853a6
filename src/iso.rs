//! Guest Additions ISO acquisition: URL/path construction, streaming
//! download, loop mount, and copying the mounted tree to the work
//! directory.
//!
//! The mount point and the downloaded/extracted artifacts are held by
//! RAII guards so they are released on every exit path, including a
//! failed install retry and SIGINT.

use std::fs;
use std::io::Read;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::{check_interrupted, exec};

/// Filename of the Guest Additions ISO for a given VirtualBox version.
pub fn iso_file_name(version: &str) -> String {
    format!("VBoxGuestAdditions_{version}.iso")
}

/// Download URL for a given VirtualBox version.
pub fn iso_url(base_url: &str, version: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/{version}/{}", iso_file_name(version))
}

/// Local path the ISO is downloaded to.
pub fn iso_path(iso_dir: &Path, version: &str) -> PathBuf {
    iso_dir.join(iso_file_name(version))
}

/// Read proxy configuration from the conventional environment variables.
fn proxy_from_env() -> Option<String> {
    for var in ["https_proxy", "HTTPS_PROXY", "http_proxy", "HTTP_PROXY", "all_proxy"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

/// Build a ureq agent, configuring proxy from environment if available.
fn build_http_agent(verbose: bool) -> Result<ureq::Agent> {
    let mut config = ureq::Agent::config_builder();
    if let Some(proxy_uri) = proxy_from_env() {
        if verbose {
            eprintln!("using proxy: {proxy_uri}");
        }
        let proxy = ureq::Proxy::new(&proxy_uri)
            .with_context(|| format!("invalid proxy URI: {proxy_uri}"))?;
        config = config.proxy(Some(proxy));
    }
    Ok(config.build().into())
}

/// Maximum download size (2 GiB). Guest Additions ISOs are well under
/// 100 MiB; anything near this limit means a wrong URL.
const MAX_DOWNLOAD_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Download a URL to a local file, streaming to constant memory.
///
/// A download that fails mid-stream (network error, size cap,
/// interruption) removes the partial file before returning the error.
pub fn download(url: &str, dest: &Path, verbose: bool) -> Result<()> {
    eprintln!("downloading {url}");

    let agent = build_http_agent(verbose)?;
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let result = (|| -> Result<u64> {
        let mut reader = response.into_body().into_reader();
        let mut file = fs::File::create(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;

        let mut buf = [0u8; 65536];
        let mut total: u64 = 0;
        loop {
            check_interrupted()?;
            let n = reader
                .read(&mut buf)
                .with_context(|| format!("failed to read from {url}"))?;
            if n == 0 {
                break;
            }
            std::io::Write::write_all(&mut file, &buf[..n])
                .with_context(|| format!("failed to write download to {}", dest.display()))?;
            total += n as u64;
            if total > MAX_DOWNLOAD_SIZE {
                bail!(
                    "download from {url} exceeds maximum size of {} bytes",
                    MAX_DOWNLOAD_SIZE
                );
            }
        }
        Ok(total)
    })();

    match result {
        Ok(total) => {
            if verbose {
                eprintln!("downloaded {} bytes to {}", total, dest.display());
            }
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(dest);
            Err(e)
        }
    }
}

/// RAII guard for the ISO mount point. Unmounts and removes the
/// directory on drop; already-released paths are left alone.
pub struct MountGuard {
    path: PathBuf,
    mounted: bool,
}

impl MountGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unmount(&mut self) {
        if self.mounted {
            let _ = Command::new("umount").arg(&self.path).status();
            let _ = fs::remove_dir(&self.path);
            self.mounted = false;
        }
    }

    /// Unmount, treating a failed umount as an error. For the happy
    /// path, where proceeding with a still-mounted tree would be wrong;
    /// `Drop` keeps the best-effort variant. On failure the guard stays
    /// mounted so drop retries the release.
    pub fn unmount_checked(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        exec::run(Command::new("umount").arg(&self.path), false)?;
        let _ = fs::remove_dir(&self.path);
        self.mounted = false;
        Ok(())
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Loop-mount an ISO read-only. The returned guard unmounts on drop.
pub fn mount_iso(iso: &Path, mount_dir: &Path, verbose: bool) -> Result<MountGuard> {
    eprintln!("mounting {} at {}", iso.display(), mount_dir.display());
    fs::create_dir_all(mount_dir)
        .with_context(|| format!("failed to create mount point {}", mount_dir.display()))?;

    let mut cmd = Command::new("mount");
    cmd.args(["-o", "loop,ro"]).arg(iso).arg(mount_dir);
    if let Err(e) = exec::run(&mut cmd, verbose) {
        let _ = fs::remove_dir(mount_dir);
        return Err(e);
    }

    Ok(MountGuard {
        path: mount_dir.to_path_buf(),
        mounted: true,
    })
}

/// RAII guard for the downloaded ISO and the extraction directory.
/// Removes both on drop; missing paths are not an error, so cleanup is
/// idempotent.
pub struct WorkspaceGuard {
    iso: PathBuf,
    work_dir: PathBuf,
}

impl WorkspaceGuard {
    pub fn new(iso: PathBuf, work_dir: PathBuf) -> Self {
        Self { iso, work_dir }
    }

    pub fn cleanup(&mut self) {
        let _ = fs::remove_file(&self.iso);
        let _ = fs::remove_dir_all(&self.work_dir);
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Copy a directory tree: directories, regular files, and symlinks.
///
/// File permissions are preserved by `fs::copy`; directory permissions
/// are applied after their contents are copied, since the source (a
/// read-only ISO mount) may carry write-less directory modes.
pub fn copy_tree(src_dir: &Path, dst_dir: &Path, verbose: bool) -> Result<()> {
    let entries = fs::read_dir(src_dir)
        .with_context(|| format!("failed to read directory {}", src_dir.display()))?;

    for entry in entries {
        check_interrupted()?;
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", src_dir.display()))?;
        let src_path = entry.path();
        let dst_path = dst_dir.join(entry.file_name());

        copy_entry(&src_path, &dst_path, verbose)
            .with_context(|| format!("failed to copy {}", src_path.display()))?;
    }

    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, verbose: bool) -> Result<()> {
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?;
    let file_type = meta.file_type();

    if file_type.is_dir() {
        fs::create_dir(dst)
            .with_context(|| format!("failed to create directory {}", dst.display()))?;
        copy_tree(src, dst, verbose)?;
        fs::set_permissions(dst, meta.permissions())
            .with_context(|| format!("failed to set permissions on {}", dst.display()))?;
    } else if file_type.is_file() {
        fs::copy(src, dst).with_context(|| format!("failed to copy file {}", src.display()))?;
    } else if file_type.is_symlink() {
        let target = fs::read_link(src)
            .with_context(|| format!("failed to read symlink {}", src.display()))?;
        unix_fs::symlink(&target, dst)
            .with_context(|| format!("failed to create symlink {}", dst.display()))?;
    } else if verbose {
        eprintln!("skipping special file {}", src.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_iso_file_name() {
        assert_eq!(iso_file_name("7.1.4"), "VBoxGuestAdditions_7.1.4.iso");
    }

    #[test]
    fn test_iso_url_deterministic() {
        let url = iso_url("https://download.virtualbox.org/virtualbox", "7.0.20");
        assert_eq!(
            url,
            "https://download.virtualbox.org/virtualbox/7.0.20/VBoxGuestAdditions_7.0.20.iso"
        );
        // Trailing slash on the base must not double up.
        assert_eq!(
            iso_url("https://example.com/vbox/", "7.0.20"),
            "https://example.com/vbox/7.0.20/VBoxGuestAdditions_7.0.20.iso"
        );
    }

    #[test]
    fn test_iso_path() {
        assert_eq!(
            iso_path(Path::new("/tmp"), "7.1.4"),
            PathBuf::from("/tmp/VBoxGuestAdditions_7.1.4.iso")
        );
    }

    #[test]
    fn test_copy_tree() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        fs::create_dir(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/file.txt"), b"contents").unwrap();
        fs::write(src.path().join("installer.run"), b"#!/bin/sh\n").unwrap();
        fs::set_permissions(
            src.path().join("installer.run"),
            fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        unix_fs::symlink("installer.run", src.path().join("link")).unwrap();

        copy_tree(src.path(), dst.path(), false).unwrap();

        assert_eq!(
            fs::read(dst.path().join("sub/file.txt")).unwrap(),
            b"contents"
        );
        let mode = fs::metadata(dst.path().join("installer.run"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            fs::read_link(dst.path().join("link")).unwrap(),
            PathBuf::from("installer.run")
        );
    }

    #[test]
    fn test_workspace_guard_removes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("fake.iso");
        let work = dir.path().join("work");
        fs::write(&iso, b"iso").unwrap();
        fs::create_dir(&work).unwrap();
        fs::write(work.join("file"), b"x").unwrap();

        drop(WorkspaceGuard::new(iso.clone(), work.clone()));

        assert!(!iso.exists());
        assert!(!work.exists());
    }

    #[test]
    fn test_workspace_guard_idempotent_on_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut guard = WorkspaceGuard::new(
            dir.path().join("never-created.iso"),
            dir.path().join("never-created"),
        );
        // Must not panic, repeatedly.
        guard.cleanup();
        guard.cleanup();
    }

    #[test]
    fn test_mount_guard_noop_when_released() {
        let mut guard = MountGuard {
            path: PathBuf::from("/nonexistent/mount"),
            mounted: false,
        };
        guard.unmount();
        assert!(guard.unmount_checked().is_ok());
    }

    #[test]
    fn test_mount_guard_unmount_checked_propagates_failure() {
        let mut guard = MountGuard {
            path: PathBuf::from("/definitely/not/mounted"),
            mounted: true,
        };
        assert!(guard.unmount_checked().is_err());
        // Drop falls back to the best-effort unmount.
    }

    #[test]
    fn test_download_failure_removes_partial_file() {
        use std::net::TcpListener;

        // Serve a response that promises more bytes than it delivers,
        // then close the connection mid-body.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = std::io::Read::read(&mut stream, &mut buf);
            let _ = std::io::Write::write_all(
                &mut stream,
                b"HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\ntruncated",
            );
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("VBoxGuestAdditions_7.1.4.iso");
        let url = format!("http://{addr}/VBoxGuestAdditions_7.1.4.iso");

        assert!(download(&url, &dest, false).is_err());
        assert!(!dest.exists());
        server.join().unwrap();
    }
}
