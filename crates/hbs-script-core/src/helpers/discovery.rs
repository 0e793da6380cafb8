use std::path::{Path, PathBuf};

use crate::error::{HbsScriptError, Result};

/// List helper script files directly inside `dir` whose names end with `suffix`.
///
/// Non-recursive; subdirectories are skipped even when their names match. Results are
/// sorted by file name so load order is stable between runs, though nothing should
/// depend on it. A missing directory yields an empty list.
pub fn discover(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        tracing::debug!(
            dir = %dir.display(),
            "helper directory does not exist, no helpers loaded"
        );
        return Ok(Vec::new());
    }

    let scan_err = |e| HbsScriptError::HelperScan {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let path = entry.path();
        let matches = entry
            .file_name()
            .as_encoded_bytes()
            .ends_with(suffix.as_bytes());
        if matches && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
