//! Capture-file conversion layer.
//!
//! Everything `sounder-core` deliberately does not do lives here: file
//! reading, progress reporting, cooperative cancellation, atomic
//! container writes, directory scanning and parallel batch conversion.
//! This crate never opens dialogs or prompts; callers get structured
//! results and log lines.

pub mod batch;
pub mod scan;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use thiserror::Error;

use sounder_core::{
    container, detect_format, CanonicalRecordModel, ContainerFormatError, DatagramFramer, Decoded,
    FileMeta, Pipeline,
};

/// Fatal error converting one file.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unrecognized capture format in {}", .0.display())]
    UnknownFormat(PathBuf),

    #[error("conversion cancelled")]
    Cancelled,

    #[error(transparent)]
    Container(#[from] ContainerFormatError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Conversion settings, CLI-provided or defaulted. No global state.
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    /// Gzip the container payload.
    pub compress: bool,
    /// Rewrite containers that are already up to date.
    pub overwrite: bool,
    /// Batch worker threads; 0 means one per core.
    pub jobs: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            compress: true,
            overwrite: false,
            jobs: 0,
        }
    }
}

/// Cooperative cancellation handle, shared between the caller (or a
/// signal handler) and in-flight conversions. Checked between records,
/// never mid-record.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callback: (bytes processed, bytes total).
pub type ProgressFn<'a> = &'a mut dyn FnMut(u64, u64);

/// Convert one capture file into a canonical model.
///
/// The returned [`Decoded`] pairs the (possibly partial) model with the
/// per-file diagnostic list; only unreadable input or an unknown format
/// is fatal. Cancellation aborts between records and yields
/// [`ConvertError::Cancelled`] with nothing written anywhere.
pub fn convert_file(
    path: &Path,
    options: &ConvertOptions,
    cancel: &CancelToken,
    mut progress: Option<ProgressFn<'_>>,
) -> Result<Decoded, ConvertError> {
    let data = fs::read(path)?;
    let format =
        detect_format(&data).map_err(|_| ConvertError::UnknownFormat(path.to_path_buf()))?;
    debug!("{}: detected {} format, {} bytes", path.display(), format, data.len());

    let meta = FileMeta {
        source_path: path.display().to_string(),
        source_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        format: Some(format),
        converted_at: Utc::now().to_rfc3339(),
        compressed: options.compress,
        source_bytes: data.len() as u64,
    };

    let mut pipeline = Pipeline::new(meta);
    let mut framer = DatagramFramer::new(&data, format);
    let total = framer.bytes_total();
    loop {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        let Some(item) = framer.next() else {
            break;
        };
        match item {
            Ok(record) => pipeline.feed(&record),
            Err(diagnostic) => {
                warn!("{}: {}", path.display(), diagnostic);
                pipeline.push_diagnostic(diagnostic);
            }
        }
        if let Some(callback) = progress.as_mut() {
            callback(framer.bytes_consumed(), total);
        }
    }

    Ok(pipeline.finish())
}

/// Container path for one input file in `out_dir`:
/// `survey_0001.all` becomes `survey_0001.all.swc`.
pub fn output_path_for(input: &Path, out_dir: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    out_dir.join(format!("{}.swc", name))
}

/// Write a container atomically: serialize to a temporary file next to
/// the destination, then rename into place. An interrupted write leaves
/// either the old container or nothing, never a torn file.
pub fn write_container_atomic(
    model: &CanonicalRecordModel,
    dest: &Path,
    compress: bool,
) -> Result<(), ConvertError> {
    let bytes = container::serialize(model, compress)?;
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, &bytes)?;
    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_output_path_keeps_source_name() {
        let out = output_path_for(Path::new("/data/raw/line_0042.kmall"), Path::new("/data/pkl"));
        assert_eq!(out, PathBuf::from("/data/pkl/line_0042.kmall.swc"));
    }
}
