//! Capture-file discovery for directory inputs.

use std::io;
use std::path::{Path, PathBuf};

/// Extensions that mark capture files. The content-based format
/// detection still decides what a file actually is; the extension only
/// selects candidates from a directory.
const CAPTURE_EXTENSIONS: [&str; 2] = ["kmall", "all"];

fn has_capture_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            CAPTURE_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Find capture files in a directory, sorted by path. With `recursive`
/// set, subdirectories are searched too.
pub fn find_capture_files(dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    visit(dir, recursive, &mut found)?;
    found.sort();
    Ok(found)
}

fn visit(dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if recursive {
                visit(&path, recursive, found)?;
            }
        } else if has_capture_extension(&path) {
            found.push(path);
        }
    }
    Ok(())
}
