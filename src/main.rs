use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use vboxga::{config, installer, iso, packages, system_check, systemd};

#[derive(Parser)]
#[command(
    name = "vboxga",
    about = "Install VirtualBox Guest Additions in a dnf-based Linux guest"
)]
struct Cli {
    /// VirtualBox version to fetch guest additions for (e.g. 7.1.4)
    #[arg(long = "virtualbox-version")]
    virtualbox_version: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Path to config file (default: ~/.config/vboxga/config)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !vboxga::is_privileged() {
        bail!("vboxga requires root privileges; run with sudo");
    }

    vboxga::validate_version(&cli.virtualbox_version)?;
    vboxga::install_signal_handlers();

    if cli.verbose {
        let resolved = config::resolve_path(cli.config.as_deref())?;
        eprintln!("config: {}", resolved.display());
    }
    let cfg = config::load(cli.config.as_deref())?;

    system_check::check_dependencies(
        &[
            ("dnf", "dnf-based distribution required"),
            ("mount", "util-linux"),
            ("umount", "util-linux"),
        ],
        cli.verbose,
    )?;

    packages::install_build_deps(cli.verbose)?;

    let version = &cli.virtualbox_version;
    let url = iso::iso_url(&cfg.base_url, version);
    let iso_file = iso::iso_path(&cfg.iso_dir, version);

    // From here on the ISO and work directory are cleaned up on every
    // exit path, including a failed or interrupted download and a
    // failed install.
    let mut workspace = iso::WorkspaceGuard::new(iso_file.clone(), cfg.work_dir.clone());

    iso::download(&url, &iso_file, cli.verbose)?;

    let mut mount = iso::mount_iso(&iso_file, &cfg.mount_dir, cli.verbose)?;
    fs::create_dir_all(&cfg.work_dir)
        .with_context(|| format!("failed to create {}", cfg.work_dir.display()))?;
    eprintln!(
        "copying {} -> {}",
        mount.path().display(),
        cfg.work_dir.display()
    );
    match iso::copy_tree(mount.path(), &cfg.work_dir, cli.verbose) {
        Ok(()) => mount.unmount_checked()?,
        Err(e) => {
            mount.unmount();
            return Err(e);
        }
    }

    installer::install_with_fallback(&cfg.work_dir, cli.verbose)?;

    // Cleanup before the prompt; the guard's drop is a no-op after this.
    workspace.cleanup();

    systemd::prompt_reboot(cfg.interactive, cli.verbose)?;
    eprintln!("done");
    Ok(())
}
