use anyhow::Result;
use std::path::{Path, PathBuf};

pub const LOG_FOLDER_NAME: &str = "Shell_Log";

/// Folder the executable runs from, else the current working directory.
pub fn resolve_deployment_folder() -> PathBuf {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return dir.to_path_buf();
        }
    }

    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Resolve log folder (absolute path)
pub fn resolve_log_folder() -> Result<PathBuf> {
    // An existing `Shell_Log/` above the working directory wins, so nested invocations (tests,
    // sub-crates) share one folder instead of scattering new ones.
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(found) = find_existing_log_folder(&cwd, 12) {
            return Ok(found);
        }
    }

    let candidates = [
        Some(resolve_deployment_folder().join(LOG_FOLDER_NAME)),
        dirs::data_local_dir().map(|d| d.join("installer-shell").join(LOG_FOLDER_NAME)),
    ];
    for candidate in candidates.into_iter().flatten() {
        if std::fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(anyhow::anyhow!("Failed to create a log folder"))
}

/// Walks up from `start` (at most `max_depth` levels) looking for an existing log folder.
pub fn find_existing_log_folder(start: &Path, max_depth: usize) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    for _ in 0..max_depth {
        let candidate = dir.join(LOG_FOLDER_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}
