//! Filesystem side of the pipeline: content-addressed placement, the
//! `processed/` holding area for duplicates, and the failure quarantine.
//!
//! Permanent names are `{fingerprint}_{sanitized-original-name}`, so the
//! storage directory is write-once per fingerprint: concurrent attempts
//! on different files never collide, and attempts on the same bytes
//! target the same path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Strips path-traversal sequences and disallowed characters from an
/// original filename, leaving `[A-Za-z0-9._-]` only.
pub fn sanitize_filename(name: &str) -> String {
    // Drop any directory components an attacker may have smuggled in.
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned = base.replace("..", "");
    let cleaned = DISALLOWED.replace_all(&cleaned, "_");
    let cleaned = cleaned
        .trim_matches(|c| c == '_' || c == '.')
        .to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Moves an inbound file into permanent storage under its
/// content-addressed name and returns the destination path.
///
/// The move is `rename` where the filesystem allows it; across devices
/// it copies to a `.part` sibling and renames, so a half-written file is
/// never visible at the destination. An existing destination holds the
/// same bytes (same fingerprint), so it is kept and the inbound copy is
/// removed.
pub fn place_file(src: &Path, fingerprint: &str, storage_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(storage_dir)
        .with_context(|| format!("Failed to create storage dir: {}", storage_dir.display()))?;

    let original = src
        .file_name()
        .ok_or_else(|| anyhow!("Inbound path has no filename: {}", src.display()))?
        .to_string_lossy();
    let dest = storage_dir.join(format!("{}_{}", fingerprint, sanitize_filename(&original)));

    if dest.exists() {
        fs::remove_file(src)
            .with_context(|| format!("Failed to remove inbound duplicate: {}", src.display()))?;
        return Ok(dest);
    }

    if fs::rename(src, &dest).is_err() {
        // Cross-device fallback: stage next to the destination, then rename.
        let staging = dest.with_extension("part");
        fs::copy(src, &staging)
            .with_context(|| format!("Failed to copy {} into storage", src.display()))?;
        fs::rename(&staging, &dest)
            .with_context(|| format!("Failed to finalize {}", dest.display()))?;
        fs::remove_file(src)
            .with_context(|| format!("Failed to remove inbound file: {}", src.display()))?;
    }

    Ok(dest)
}

/// Moves a resolved duplicate into the `processed/` holding area next to
/// its inbound location. Expected flow, not an error.
pub fn move_to_processed(src: &Path) -> Result<PathBuf> {
    move_to_sibling_dir(src, src, "processed")
}

/// Moves a failed input into the `failed/` quarantine area next to its
/// original inbound location and appends a structured line to the
/// append-only `errors.log` there. The file may have already been placed
/// in permanent storage; `current` is wherever it resides now.
pub fn quarantine_file(current: &Path, inbound: &Path, error: &str) -> Result<PathBuf> {
    let moved = move_to_sibling_dir(current, inbound, "failed")?;

    let log_path = moved
        .parent()
        .map(|d| d.join("errors.log"))
        .ok_or_else(|| anyhow!("Quarantine dir has no parent"))?;
    let mut log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open error log: {}", log_path.display()))?;
    writeln!(log, "{} - {} - {}", Utc::now().to_rfc3339(), inbound.display(), error)
        .context("Failed to append to error log")?;

    Ok(moved)
}

/// Moves `src` into `<parent-of-anchor>/<subdir>/<filename-of-src>`.
fn move_to_sibling_dir(src: &Path, anchor: &Path, subdir: &str) -> Result<PathBuf> {
    let parent = anchor
        .parent()
        .ok_or_else(|| anyhow!("Path has no parent directory: {}", anchor.display()))?;
    let dir = parent.join(subdir);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {} dir: {}", subdir, dir.display()))?;

    let name = src
        .file_name()
        .ok_or_else(|| anyhow!("Path has no filename: {}", src.display()))?;
    let dest = dir.join(name);
    if fs::rename(src, &dest).is_err() {
        fs::copy(src, &dest)
            .with_context(|| format!("Failed to move {} to {}", src.display(), dest.display()))?;
        fs::remove_file(src)?;
    }
    Ok(dest)
}
