//! Parallel batch conversion.
//!
//! Files are independent, so the batch is a plain work queue: a bounded
//! pool of workers, each running one pipeline instance per file with no
//! shared mutable state. Outputs that are already newer than their
//! input are skipped unless overwriting was requested.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};
use serde::Serialize;

use crate::{
    convert_file, output_path_for, write_container_atomic, CancelToken, ConvertError,
    ConvertOptions,
};

/// What happened to one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Converted,
    Skipped,
    Failed,
}

/// Per-file batch result.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub status: OutcomeStatus,
    pub error: Option<String>,
    /// Non-fatal diagnostics collected while decoding.
    pub diagnostics: usize,
    pub pings: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

/// Whole-batch tally, serializable for reporting layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Input bytes minus output bytes over converted files.
    pub bytes_saved: i64,
    pub errors: Vec<String>,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchSummary {
    fn tally(&mut self, outcome: FileOutcome) {
        match outcome.status {
            OutcomeStatus::Converted => {
                self.converted += 1;
                self.bytes_saved += outcome.input_bytes as i64 - outcome.output_bytes as i64;
            }
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => {
                self.failed += 1;
                if let Some(error) = &outcome.error {
                    self.errors
                        .push(format!("{}: {}", outcome.input.display(), error));
                }
            }
        }
        self.outcomes.push(outcome);
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("summary serializes")
    }
}

/// True when the output exists and is newer than the input, in which
/// case conversion is redundant.
fn up_to_date(input: &Path, output: &Path) -> bool {
    fn mtime(path: &Path) -> Option<SystemTime> {
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
    match (mtime(input), mtime(output)) {
        (Some(input_mtime), Some(output_mtime)) => output_mtime > input_mtime,
        _ => false,
    }
}

fn convert_one(
    input: &Path,
    out_dir: &Path,
    options: &ConvertOptions,
    cancel: &CancelToken,
) -> FileOutcome {
    let output = output_path_for(input, out_dir);
    let input_bytes = fs::metadata(input).map(|m| m.len()).unwrap_or(0);

    if !options.overwrite && up_to_date(input, &output) {
        info!("{}: up to date, skipped", input.display());
        return FileOutcome {
            input: input.to_path_buf(),
            output: Some(output),
            status: OutcomeStatus::Skipped,
            error: None,
            diagnostics: 0,
            pings: 0,
            input_bytes,
            output_bytes: 0,
        };
    }

    let result = convert_file(input, options, cancel, None)
        .and_then(|decoded| {
            write_container_atomic(&decoded.model, &output, options.compress)?;
            Ok(decoded)
        });

    match result {
        Ok(decoded) => {
            let output_bytes = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
            info!(
                "{}: {} pings, {} diagnostics, {} -> {} bytes",
                input.display(),
                decoded.model.ping_count(),
                decoded.diagnostics.len(),
                input_bytes,
                output_bytes
            );
            FileOutcome {
                input: input.to_path_buf(),
                output: Some(output),
                status: OutcomeStatus::Converted,
                error: None,
                diagnostics: decoded.diagnostics.len(),
                pings: decoded.model.ping_count(),
                input_bytes,
                output_bytes,
            }
        }
        Err(error) => {
            warn!("{}: {}", input.display(), error);
            FileOutcome {
                input: input.to_path_buf(),
                output: None,
                status: OutcomeStatus::Failed,
                error: Some(error.to_string()),
                diagnostics: 0,
                pings: 0,
                input_bytes,
                output_bytes: 0,
            }
        }
    }
}

/// Convert a set of capture files with a bounded worker pool.
///
/// Cancellation stops workers between files (and between records
/// within the file each worker is on); files already converted stay
/// converted.
pub fn convert_batch(
    inputs: &[PathBuf],
    out_dir: &Path,
    options: &ConvertOptions,
    cancel: &CancelToken,
) -> BatchSummary {
    let jobs = if options.jobs == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        options.jobs
    };
    let jobs = jobs.min(inputs.len()).max(1);

    let (task_tx, task_rx) = crossbeam::channel::unbounded::<PathBuf>();
    for input in inputs {
        task_tx.send(input.clone()).expect("queue is open");
    }
    drop(task_tx);

    let (result_tx, result_rx) = crossbeam::channel::unbounded::<FileOutcome>();

    crossbeam::scope(|scope| {
        for _ in 0..jobs {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move |_| {
                while let Ok(input) = task_rx.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let outcome = convert_one(&input, out_dir, options, cancel);
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
    })
    .expect("batch worker panicked");
    drop(result_tx);

    let mut summary = BatchSummary::default();
    for outcome in result_rx.iter() {
        summary.tally(outcome);
    }
    // Keep the report ordering stable regardless of which worker
    // finished first
    summary.outcomes.sort_by(|a, b| a.input.cmp(&b.input));
    summary
}
