use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use log::{info, warn};
use walkdir::WalkDir;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Read a source document. A missing file is an error, not an empty document.
pub fn read_source(path: &Path, label: &str) -> Result<Vec<u8>> {
    if !path.is_file() {
        bail!("{label} bookmarks file not found: {}", display_path(path));
    }
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn timestamp_suffix(now: DateTime<Local>) -> String {
    now.format(STAMP_FORMAT).to_string()
}

/// Remove the regular files directly inside `dir`, creating it when absent.
pub fn clear_stage_dir(dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        fs::remove_file(entry.path())
            .with_context(|| format!("failed to remove {}", entry.path().display()))?;
        removed += 1;
    }
    Ok(removed)
}

/// Write `<prefix>_<stamp>.<ext>` into `dir`.
pub fn write_stage_output(
    dir: &Path,
    prefix: &str,
    ext: &str,
    contents: &str,
    stamp: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{prefix}_{stamp}.{ext}"));
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Newest `.json` file directly inside `dir`, by modification time then name.
pub fn latest_json_file(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut newest = None;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file()
            || entry.path().extension().and_then(|ext| ext.to_str()) != Some("json")
        {
            continue;
        }
        let modified = entry
            .metadata()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?
            .modified()
            .with_context(|| format!("failed to read mtime of {}", entry.path().display()))?;
        let candidate = (modified, entry.path().to_path_buf());
        if newest.as_ref().is_none_or(|current| candidate > *current) {
            newest = Some(candidate);
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[derive(Debug, Clone)]
pub struct ReplaceReport {
    pub target: PathBuf,
    pub backup_path: Option<PathBuf>,
}

/// Replace `target` with `contents`, copying the prior file into `backup_dir`
/// first. A failed write restores the original.
pub fn replace_with_backup(
    target: &Path,
    contents: &str,
    backup_dir: &Path,
    stamp: &str,
) -> Result<ReplaceReport> {
    write_with_rollback(target, backup_dir, stamp, |path| {
        fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
    })
}

fn write_with_rollback<F>(
    target: &Path,
    backup_dir: &Path,
    stamp: &str,
    write: F,
) -> Result<ReplaceReport>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let backup_path = if target.exists() {
        let file_name = target
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", target.display()))?
            .to_string_lossy()
            .to_string();
        fs::create_dir_all(backup_dir)
            .with_context(|| format!("failed to create backup dir {}", backup_dir.display()))?;
        let backup_path = backup_dir.join(format!("{file_name}.backup.{stamp}"));
        fs::copy(target, &backup_path).with_context(|| {
            format!(
                "failed to back up {} to {}",
                target.display(),
                backup_path.display()
            )
        })?;
        Some(backup_path)
    } else {
        None
    };

    if let Err(error) = write(target) {
        match &backup_path {
            Some(backup) => {
                warn!(
                    "event=write_rollback target={} backup={}",
                    display_path(target),
                    display_path(backup)
                );
                fs::copy(backup, target).with_context(|| {
                    format!(
                        "failed to restore {} from {} after write error: {error:#}",
                        target.display(),
                        backup.display()
                    )
                })?;
            }
            None => warn!(
                "event=write_failed target={} backup=none",
                display_path(target)
            ),
        }
        return Err(error.context(format!("failed to replace {}", target.display())));
    }

    info!(
        "event=file_replaced target={} backup={}",
        display_path(target),
        backup_path
            .as_deref()
            .map(display_path)
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(ReplaceReport {
        target: target.to_path_buf(),
        backup_path,
    })
}

pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
