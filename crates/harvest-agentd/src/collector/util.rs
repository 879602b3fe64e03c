use std::{process::Stdio, time::Duration};

use tokio::process::{Child, Command};

use crate::config::CollectorConfig;

pub fn collector_command(cfg: &CollectorConfig) -> Command {
    let mut cmd = Command::new(&cfg.program);
    cmd.args(cfg.args.iter().map(|s| s.as_str()));
    if let Some(cwd) = &cfg.cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());
    cmd.kill_on_drop(true);
    cmd
}

/// SIGTERM, then SIGKILL if the child is still alive after `grace`.
#[cfg(target_family = "unix")]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if let Some(id) = child.id() {
        // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
        unsafe {
            libc::kill(id as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return Ok(());
        }
    }
    child.kill().await
}

#[cfg(target_family = "windows")]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    child.kill().await
}
