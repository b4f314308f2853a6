//! Reboot handling: interactive prompt plus the actual reboot via the
//! logind D-Bus interface, with a `systemctl reboot` process fallback
//! for guests where the system bus is unreachable.

use std::process::Command;

use anyhow::Result;

use crate::exec;

mod dbus {
    use anyhow::{Context, Result};
    use zbus::blocking::proxy::Proxy;
    use zbus::blocking::Connection;

    fn connect() -> Result<Connection> {
        Connection::system().context("failed to connect to system dbus")
    }

    fn login_manager(conn: &Connection) -> Result<Proxy<'_>> {
        Proxy::new(
            conn,
            "org.freedesktop.login1",
            "/org/freedesktop/login1",
            "org.freedesktop.login1.Manager",
        )
        .context("failed to create logind manager proxy")
    }

    pub fn reboot() -> Result<()> {
        let conn = connect()?;
        let proxy = login_manager(&conn)?;
        // false: no polkit interactivity; we are already root.
        proxy
            .call_method("Reboot", &(false,))
            .context("logind Reboot failed")?;
        Ok(())
    }
}

/// Reboot the guest. Prefers logind; falls back to systemctl.
pub fn reboot(verbose: bool) -> Result<()> {
    match dbus::reboot() {
        Ok(()) => Ok(()),
        Err(e) => {
            if verbose {
                eprintln!("logind reboot failed ({e:#}); falling back to systemctl");
            }
            exec::run(Command::new("systemctl").arg("reboot"), verbose)
        }
    }
}

/// An affirmative reboot answer is "y" in either case; anything else,
/// including "yes", declines.
pub fn parse_reboot_answer(input: &str) -> bool {
    matches!(input.trim(), "y" | "Y")
}

/// Ask whether to reboot and act on the answer. Non-interactive runs
/// skip the prompt and the reboot.
pub fn prompt_reboot(interactive: bool, verbose: bool) -> Result<()> {
    if !interactive {
        eprintln!("non-interactive mode; skipping reboot");
        return Ok(());
    }

    eprint!("Installation complete. Changes take effect after a reboot. Reboot now? [y/N]: ");
    let _ = std::io::Write::flush(&mut std::io::stderr());

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        eprintln!("reboot skipped");
        return Ok(());
    }

    if parse_reboot_answer(&answer) {
        eprintln!("rebooting");
        reboot(verbose)
    } else {
        eprintln!("reboot skipped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reboot_answer_affirmative() {
        assert!(parse_reboot_answer("y"));
        assert!(parse_reboot_answer("Y"));
        assert!(parse_reboot_answer("  y \n"));
    }

    #[test]
    fn test_parse_reboot_answer_negative() {
        assert!(!parse_reboot_answer(""));
        assert!(!parse_reboot_answer("\n"));
        assert!(!parse_reboot_answer("n"));
        assert!(!parse_reboot_answer("yes"));
        assert!(!parse_reboot_answer("maybe"));
    }

    #[test]
    fn test_prompt_skipped_when_non_interactive() {
        assert!(prompt_reboot(false, false).is_ok());
    }
}
