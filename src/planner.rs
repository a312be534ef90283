// File set planning: walk the local directory once, sort the result and
// drop files the deposition already holds.

use crate::error::PlanError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A local file eligible for upload in this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    pub basename: String,
    pub size: u64,
}

/// Final path component as a string; this is the remote filename.
///
/// Names that are not valid UTF-8 are converted lossily (invalid bytes
/// become U+FFFD). The converted name is both compared against the
/// deposition and used as the remote key, so this is logged.
pub fn basename(path: &Path) -> String {
    let Some(name) = path.file_name() else {
        return String::new();
    };
    match name.to_str() {
        Some(name) => name.to_string(),
        None => {
            let lossy = name.to_string_lossy().into_owned();
            tracing::warn!(
                path = %path.display(),
                remote_name = %lossy,
                "file name is not valid UTF-8, using a lossy conversion"
            );
            lossy
        }
    }
}

/// Files to upload in plan order, plus the ones left out because the
/// deposition already holds their basename.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    pub files: Vec<FileCandidate>,
    pub skipped: Vec<FileCandidate>,
}

/// Every regular file under `dir`, sorted by path bytes.
///
/// When `overwrite` is false, files whose basename appears in `existing`
/// are left out. Matching is exact and ignores the subdirectory, so two
/// local files named `data.csv` in different folders are both skipped
/// once the deposition holds a `data.csv`.
pub fn plan(dir: &Path, overwrite: bool, existing: &[String]) -> Result<Plan, PlanError> {
    let (files, skipped) = split_existing(scan(dir)?, overwrite, existing);
    Ok(Plan { files, skipped })
}

/// Recursive listing of the regular files under `dir`, sorted by path
/// bytes. Directories and symlinks are not listed.
pub fn scan(dir: &Path) -> Result<Vec<FileCandidate>, PlanError> {
    if !dir.is_dir() {
        return Err(PlanError::NotADirectory(dir.to_path_buf()));
    }
    let walk_err = |source| PlanError::Walk {
        root: dir.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(walk_err)?;
        // Symlinks report their own type here, so they are skipped too.
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry.metadata().map_err(walk_err)?.len();
        let path = entry.into_path();
        candidates.push(FileCandidate {
            basename: basename(&path),
            path,
            size,
        });
    }
    candidates.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
    Ok(candidates)
}

/// Split `candidates` into (to upload, already remote). With `overwrite`
/// nothing is skipped. Order is preserved on both sides.
pub fn split_existing(
    candidates: Vec<FileCandidate>,
    overwrite: bool,
    existing: &[String],
) -> (Vec<FileCandidate>, Vec<FileCandidate>) {
    if overwrite {
        return (candidates, Vec::new());
    }
    let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let (skipped, kept): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| existing.contains(c.basename.as_str()));
    for c in &skipped {
        tracing::info!(path = %c.path.display(), "already in deposition, skipping");
    }
    (kept, skipped)
}
