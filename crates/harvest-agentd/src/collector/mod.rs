//! Record source backed by an external collector process.
//!
//! Each job spawns the configured program; every non-blank stdout line must
//! be one JSON record. The process is stopped when the job is cancelled or
//! the consumer goes away.
mod util;

use futures_util::{StreamExt, stream};
use harvest_core::{RecordSource, RecordStream};
use harvest_model::Record;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, trace, warn};

use crate::config::CollectorConfig;
use util::{collector_command, kill_graceful};

/// Records buffered between the collector's stdout and the batcher.
const CHANNEL_CAPACITY: usize = 1024;

pub struct ProcSource {
    cfg: CollectorConfig,
}

impl ProcSource {
    pub fn new(cfg: CollectorConfig) -> Self {
        Self { cfg }
    }
}

impl RecordSource for ProcSource {
    fn records(&self, ctx: CancellationToken) -> RecordStream {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cfg = self.cfg.clone();
        tokio::spawn(run_collector(cfg, tx, ctx).in_current_span());

        stream::unfold(rx, |mut rx| async move {
            let record = rx.recv().await?;
            Some((record, rx))
        })
        .boxed()
    }
}

async fn run_collector(cfg: CollectorConfig, tx: mpsc::Sender<Record>, ctx: CancellationToken) {
    trace!(target: "harvest.collector", program = %cfg.program, args = ?cfg.args, "spawn");

    let mut child = match collector_command(&cfg).spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(target: "harvest.collector", program = %cfg.program, error = %e, "unable to start collector");
            return;
        }
    };
    let Some(stdout) = child.stdout.take() else {
        error!(target: "harvest.collector", "collector stdout not captured");
        let _ = kill_graceful(&mut child, cfg.stop_grace).await;
        return;
    };
    let mut lines = BufReader::new(stdout).lines();
    let mut emitted: u64 = 0;
    let mut skipped: u64 = 0;

    let stopped = loop {
        let line = tokio::select! {
            biased;
            _ = ctx.cancelled() => break true,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break false,
            Err(e) => {
                error!(target: "harvest.collector", error = %e, "failed reading collector output");
                break true;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let record: Record = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                skipped += 1;
                warn!(target: "harvest.collector", error = %e, "skipping malformed collector line");
                continue;
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => break true,
            sent = tx.send(record) => {
                if sent.is_err() {
                    break true;
                }
                emitted += 1;
            }
        }
    };

    if stopped {
        debug!(target: "harvest.collector", "stopping collector");
        if let Err(e) = kill_graceful(&mut child, cfg.stop_grace).await {
            warn!(target: "harvest.collector", error = %e, "failed to stop collector");
        }
        return;
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            debug!(target: "harvest.collector", emitted, skipped, "collector finished");
        }
        Ok(status) => match status.code() {
            Some(code) => warn!(target: "harvest.collector", code, emitted, skipped, "collector exited with non-zero code"),
            None => warn!(target: "harvest.collector", emitted, skipped, "collector terminated by signal"),
        },
        Err(e) => error!(target: "harvest.collector", error = %e, "failed waiting for collector"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn sh(script: &str) -> ProcSource {
        ProcSource::new(CollectorConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: None,
            stop_grace: Duration::from_secs(1),
        })
    }

    #[tokio::test]
    async fn yields_one_record_per_json_line() {
        let source = sh(r#"printf '{"kind":"user","n":1}\n\nnot json\n{"kind":"group","n":2}\n'"#);
        let records: Vec<Record> = source.records(CancellationToken::new()).collect().await;

        assert_eq!(
            records,
            vec![json!({"kind": "user", "n": 1}), json!({"kind": "group", "n": 2})]
        );
    }

    #[tokio::test]
    async fn missing_program_yields_empty_stream() {
        let source = ProcSource::new(CollectorConfig {
            program: "/nonexistent/harvest-collector".to_string(),
            ..Default::default()
        });
        let records: Vec<Record> = source.records(CancellationToken::new()).collect().await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn cancellation_ends_stream_of_hung_collector() {
        let source = sh(r#"printf '{"n":1}\n'; exec sleep 30"#);
        let ctx = CancellationToken::new();
        let mut records = source.records(ctx.clone());

        assert_eq!(records.next().await, Some(json!({"n": 1})));
        ctx.cancel();

        let rest = tokio::time::timeout(Duration::from_secs(5), records.collect::<Vec<_>>())
            .await
            .expect("stream should end after cancellation");
        assert!(rest.is_empty());
    }
}
