//! Process signal handling.
//!
//! SIGINT / SIGTERM cancel the root token once. SIGUSR1 prints a diagnostic
//! dump to stdout and the agent keeps running.
use std::{backtrace::Backtrace, fmt::Write as _, io::Write as _};

use harvest_core::{SchedulerSnapshot, uptime_seconds};
use time::format_description::well_known::Rfc3339;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runtime counters included in a diagnostic dump.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeSummary {
    pub workers: usize,
    pub alive_tasks: usize,
}

impl RuntimeSummary {
    pub fn current() -> Self {
        let metrics = tokio::runtime::Handle::current().metrics();
        Self {
            workers: metrics.num_workers(),
            alive_tasks: metrics.num_alive_tasks(),
        }
    }
}

pub struct SignalHandler {
    shutdown: JoinHandle<()>,
    diagnostics: Option<JoinHandle<()>>,
}

impl SignalHandler {
    /// Register handlers and spawn their listeners.
    ///
    /// Registration happens before this returns, so a signal arriving right
    /// after is never lost.
    pub fn install(
        ctx: CancellationToken,
        snapshots: watch::Receiver<SchedulerSnapshot>,
    ) -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut term = signal(SignalKind::terminate())?;
            let mut int = signal(SignalKind::interrupt())?;
            let mut usr1 = signal(SignalKind::user_defined1())?;

            let shutdown = tokio::spawn(async move {
                let name = tokio::select! {
                    _ = int.recv() => "SIGINT",
                    _ = term.recv() => "SIGTERM",
                    _ = ctx.cancelled() => return,
                };
                info!(signal = name, "shutdown signal received");
                ctx.cancel();
            });

            let diagnostics = tokio::spawn(async move {
                while usr1.recv().await.is_some() {
                    let dump = capture_dump(&snapshots);
                    let mut out = std::io::stdout().lock();
                    if let Err(e) = out.write_all(dump.as_bytes()).and_then(|_| out.flush()) {
                        warn!(error = %e, "failed to write diagnostic dump");
                    }
                }
            });

            Ok(Self {
                shutdown,
                diagnostics: Some(diagnostics),
            })
        }

        #[cfg(not(unix))]
        {
            let _ = snapshots;
            let shutdown = tokio::spawn(async move {
                tokio::select! {
                    r = tokio::signal::ctrl_c() => {
                        if let Err(e) = r {
                            warn!(error = %e, "ctrl-c listener failed");
                            return;
                        }
                    }
                    _ = ctx.cancelled() => return,
                }
                info!("shutdown signal received");
                ctx.cancel();
            });
            Ok(Self {
                shutdown,
                diagnostics: None,
            })
        }
    }

    pub fn shutdown(self) {
        self.shutdown.abort();
        if let Some(d) = self.diagnostics {
            d.abort();
        }
    }
}

/// Build a dump of the latest snapshot.
///
/// The watch guard is released before the backtrace is captured so the
/// scheduler never waits on a dump.
pub fn capture_dump(snapshots: &watch::Receiver<SchedulerSnapshot>) -> String {
    let snapshot = snapshots.borrow().clone();
    let backtrace = Backtrace::force_capture().to_string();
    render_dump(&snapshot, RuntimeSummary::current(), &backtrace)
}

pub fn render_dump(snapshot: &SchedulerSnapshot, runtime: RuntimeSummary, backtrace: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== harvest-agentd diagnostic dump ===");
    let _ = writeln!(out, "uptime_seconds: {}", uptime_seconds());
    let _ = writeln!(out, "scheduler.state: {}", snapshot.state.as_str());
    match snapshot.task {
        Some(id) => {
            let _ = writeln!(out, "scheduler.task: {id}");
        }
        None => {
            let _ = writeln!(out, "scheduler.task: none");
        }
    }
    if let Some(at) = snapshot.started_at.and_then(|at| at.format(&Rfc3339).ok()) {
        let _ = writeln!(out, "scheduler.started_at: {at}");
    }
    let _ = writeln!(out, "scheduler.jobs_completed: {}", snapshot.jobs_completed);
    let _ = writeln!(out, "scheduler.jobs_degraded: {}", snapshot.jobs_degraded);
    let _ = writeln!(out, "runtime.workers: {}", runtime.workers);
    let _ = writeln!(out, "runtime.alive_tasks: {}", runtime.alive_tasks);
    let _ = writeln!(out, "--- backtrace ---");
    let _ = writeln!(out, "{backtrace}");
    out
}

#[cfg(test)]
mod tests {
    use harvest_core::SchedulerState;
    use time::macros::datetime;

    use super::*;

    #[test]
    fn dump_describes_running_job() {
        let snapshot = SchedulerSnapshot {
            state: SchedulerState::Running,
            task: Some(42),
            started_at: Some(datetime!(2024-05-01 12:00 UTC)),
            jobs_completed: 3,
            jobs_degraded: 1,
        };
        let dump = render_dump(
            &snapshot,
            RuntimeSummary {
                workers: 4,
                alive_tasks: 9,
            },
            "frame 0",
        );

        assert!(dump.contains("scheduler.state: running"));
        assert!(dump.contains("scheduler.task: 42"));
        assert!(dump.contains("scheduler.started_at: 2024-05-01T12:00:00Z"));
        assert!(dump.contains("scheduler.jobs_degraded: 1"));
        assert!(dump.contains("runtime.alive_tasks: 9"));
        assert!(dump.ends_with("frame 0\n"));
    }

    #[test]
    fn dump_of_idle_agent_has_no_task() {
        let dump = render_dump(&SchedulerSnapshot::default(), RuntimeSummary::default(), "");
        assert!(dump.contains("scheduler.state: idle"));
        assert!(dump.contains("scheduler.task: none"));
        assert!(!dump.contains("started_at"));
    }

    #[tokio::test]
    async fn capture_uses_latest_snapshot() {
        let (tx, rx) = watch::channel(SchedulerSnapshot::default());
        tx.send_replace(SchedulerSnapshot {
            state: SchedulerState::Selecting,
            ..Default::default()
        });

        let dump = capture_dump(&rx);
        assert!(dump.contains("scheduler.state: selecting"));
        assert!(dump.contains("--- backtrace ---"));

        // the receiver is not left borrowed
        tx.send_replace(SchedulerSnapshot::default());
        assert_eq!(rx.borrow().state, SchedulerState::Idle);
    }

    #[tokio::test]
    async fn cancelled_token_stops_listener() {
        let ctx = CancellationToken::new();
        let (_tx, rx) = watch::channel(SchedulerSnapshot::default());
        let handler = SignalHandler::install(ctx.clone(), rx).unwrap();

        ctx.cancel();
        handler.shutdown.await.unwrap();
        if let Some(d) = handler.diagnostics {
            d.abort();
        }
    }
}
