//! Per-iteration trace capture for annealing runs.
//!
//! Steps are pushed through a bounded channel to a writer thread that appends
//! one JSON object per line. The search blocks only if the writer falls more
//! than `TRACE_BUFFER` steps behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use serde::Serialize;

const TRACE_BUFFER: usize = 1024;

/// One annealing step as seen by the Metropolis rule.
#[derive(Debug, Clone, Serialize)]
pub struct IterationTrace {
    pub iteration: usize,
    pub temperature: f64,
    /// `None` when the candidate produced degenerate data.
    pub candidate_score: Option<f64>,
    pub current_score: f64,
    pub best_score: f64,
    pub accepted: bool,
    pub improved_best: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace io: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace encoding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("trace writer has shut down")]
    Disconnected,
    #[error("trace writer thread panicked")]
    WriterPanicked,
}

/// Receives every annealing step in order.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: IterationTrace) -> Result<(), TraceError>;
}

#[derive(Clone)]
pub struct JsonlTraceSink {
    steps: SyncSender<IterationTrace>,
}

/// Writer thread behind a [`JsonlTraceSink`].
pub struct TraceWorker {
    writer: JoinHandle<Result<usize, TraceError>>,
}

impl TraceWorker {
    /// Wait for the writer to drain and flush. Returns the number of lines
    /// written. Every sink clone must be dropped first or this never returns.
    pub fn join(self) -> Result<usize, TraceError> {
        self.writer
            .join()
            .map_err(|_| TraceError::WriterPanicked)?
    }
}

impl JsonlTraceSink {
    /// Truncate `path` and start the writer thread.
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let out = BufWriter::new(File::create(path)?);
        let (steps, inbox) = mpsc::sync_channel(TRACE_BUFFER);
        let writer = std::thread::spawn(move || drain_to_jsonl(out, inbox));
        Ok((Self { steps }, TraceWorker { writer }))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: IterationTrace) -> Result<(), TraceError> {
        self.steps.send(event).map_err(|_| TraceError::Disconnected)
    }
}

fn drain_to_jsonl<W: Write>(
    mut out: W,
    inbox: Receiver<IterationTrace>,
) -> Result<usize, TraceError> {
    let mut lines = 0usize;
    while let Ok(step) = inbox.recv() {
        serde_json::to_writer(&mut out, &step)?;
        out.write_all(b"\n")?;
        lines += 1;
    }
    out.flush()?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(iteration: usize, best_score: f64) -> IterationTrace {
        IterationTrace {
            iteration,
            temperature: 0.5,
            candidate_score: Some(best_score),
            current_score: best_score,
            best_score,
            accepted: true,
            improved_best: true,
        }
    }

    #[test]
    fn drain_writes_one_object_per_line_until_senders_close() {
        let (tx, rx) = mpsc::sync_channel(4);
        tx.send(step(0, 3.0)).unwrap();
        tx.send(step(1, 2.5)).unwrap();
        drop(tx);

        let mut buf = Vec::new();
        let lines = drain_to_jsonl(&mut buf, rx).unwrap();
        assert_eq!(lines, 2);

        let text = String::from_utf8(buf).unwrap();
        let rows: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows[1]["iteration"], 1);
        assert_eq!(rows[1]["best_score"], 2.5);
    }

    #[test]
    fn record_after_writer_exit_is_disconnected() {
        let (tx, rx) = mpsc::sync_channel::<IterationTrace>(1);
        drop(rx);
        let sink = JsonlTraceSink { steps: tx };
        assert!(matches!(
            sink.record(step(0, 1.0)),
            Err(TraceError::Disconnected)
        ));
    }
}
