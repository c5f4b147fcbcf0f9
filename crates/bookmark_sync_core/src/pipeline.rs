//! Staged run over the resolved layout.
//!
//! Each stage reads the newest output of the stage before it, clears its own
//! directory, and writes a timestamped result. Parsing happens before any
//! clearing so that a bad source leaves the previous snapshot in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use log::info;
use serde::Serialize;

use crate::chrome::parse_chrome_document;
use crate::chrome_export::{ChromeProjector, to_chrome_json};
use crate::filesystem::{
    ReplaceReport, clear_stage_dir, display_path, latest_json_file, read_source,
    replace_with_backup, timestamp_suffix, write_stage_output,
};
use crate::merge::merge_forests;
use crate::model::BookmarkNode;
use crate::runtime::ResolvedPaths;
use crate::safari::parse_safari_document;
use crate::safari_export::{
    IMPORT_INSTRUCTIONS, render_netscape_html, to_safari_forest, to_safari_json,
};
use crate::stats::{NodeCounts, count_chrome_document, count_forest};

pub const CHROME_SNAPSHOT_PREFIX: &str = "chrome_bookmarks";
pub const SAFARI_SNAPSHOT_PREFIX: &str = "safari_bookmarks";
pub const MERGED_PREFIX: &str = "merged_bookmarks";
pub const IMPORT_INSTRUCTIONS_PREFIX: &str = "safari_import_instructions";

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: &'static str,
    pub output: PathBuf,
    pub top_level: usize,
    pub nodes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChromeSyncReport {
    pub output: PathBuf,
    pub counts: Vec<(String, NodeCounts)>,
    pub live_target: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafariSyncReport {
    pub json_output: PathBuf,
    pub html_output: PathBuf,
    pub instructions_output: PathBuf,
    pub bookmarks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub chrome_source: PathBuf,
    pub safari_source: PathBuf,
    /// Live Chrome file to replace after projection. `None` leaves it untouched.
    pub live_chrome: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub chrome_snapshot: StageReport,
    pub safari_snapshot: StageReport,
    pub merged: StageReport,
    pub chrome_sync: ChromeSyncReport,
    pub safari_sync: SafariSyncReport,
}

pub fn snapshot_chrome(
    paths: &ResolvedPaths,
    source: &Path,
    now: DateTime<Local>,
) -> Result<StageReport> {
    let forest = load_chrome_source(source)?;
    write_chrome_snapshot(paths, &forest, now)
}

pub fn snapshot_safari(
    paths: &ResolvedPaths,
    source: &Path,
    now: DateTime<Local>,
) -> Result<StageReport> {
    let forest = load_safari_source(source)?;
    write_safari_snapshot(paths, &forest, now)
}

/// Read and parse a Chromium `Bookmarks` file without touching any stage.
pub fn load_chrome_source(source: &Path) -> Result<Vec<BookmarkNode>> {
    let bytes = read_source(source, "Chrome")?;
    parse_chrome_document(&bytes).with_context(|| format!("failed to parse {}", source.display()))
}

/// Read and parse a Safari `Bookmarks.plist` without touching any stage.
pub fn load_safari_source(source: &Path) -> Result<Vec<BookmarkNode>> {
    let bytes = read_source(source, "Safari")?;
    parse_safari_document(&bytes).with_context(|| format!("failed to parse {}", source.display()))
}

/// Live Chrome file for a sync: the explicit target, else the Chrome source
/// the run read from. `None` when live writes are disabled.
pub fn resolve_live_chrome(
    enabled: bool,
    explicit: Option<PathBuf>,
    chrome_source: Option<PathBuf>,
) -> Option<PathBuf> {
    if !enabled {
        return None;
    }
    explicit.or(chrome_source)
}

fn write_chrome_snapshot(
    paths: &ResolvedPaths,
    forest: &[BookmarkNode],
    now: DateTime<Local>,
) -> Result<StageReport> {
    write_forest_stage(
        "parse_chrome",
        &paths.chrome_snapshot_dir,
        CHROME_SNAPSHOT_PREFIX,
        forest,
        now,
    )
}

fn write_safari_snapshot(
    paths: &ResolvedPaths,
    forest: &[BookmarkNode],
    now: DateTime<Local>,
) -> Result<StageReport> {
    write_forest_stage(
        "parse_safari",
        &paths.safari_snapshot_dir,
        SAFARI_SNAPSHOT_PREFIX,
        forest,
        now,
    )
}

/// Merge the newest Chrome and Safari snapshots into `merged/`.
pub fn merge_snapshots(paths: &ResolvedPaths, now: DateTime<Local>) -> Result<StageReport> {
    let chrome_path = require_stage_output(&paths.chrome_snapshot_dir, "parse chrome")?;
    let safari_path = require_stage_output(&paths.safari_snapshot_dir, "parse safari")?;
    let chrome = load_forest(&chrome_path)?;
    let safari = load_forest(&safari_path)?;
    let merged = merge_forests(chrome, safari);
    write_forest_stage("merge", &paths.merged_dir, MERGED_PREFIX, &merged, now)
}

/// Project the newest merged forest into the Chromium schema.
///
/// When `live_file` is given, it is replaced with the projection after the
/// previous content has been copied into `backups/`.
pub fn sync_to_chrome(
    paths: &ResolvedPaths,
    live_file: Option<&Path>,
    now: DateTime<Local>,
) -> Result<ChromeSyncReport> {
    let merged = load_forest(&require_stage_output(&paths.merged_dir, "merge")?)?;
    let document = ChromeProjector::new().project(&merged);
    let json = to_chrome_json(&document)?;
    let stamp = timestamp_suffix(now);

    clear_stage_dir(&paths.chrome_sync_dir)?;
    let output =
        write_stage_output(&paths.chrome_sync_dir, CHROME_SNAPSHOT_PREFIX, "json", &json, &stamp)?;

    let replaced: Option<ReplaceReport> = match live_file {
        Some(target) => Some(replace_with_backup(target, &json, &paths.backups_dir, &stamp)?),
        None => None,
    };

    info!(
        "event=stage_complete stage=sync_chrome output={} live={}",
        display_path(&output),
        live_file.map(display_path).unwrap_or_else(|| "skipped".to_string())
    );
    Ok(ChromeSyncReport {
        output,
        counts: count_chrome_document(&document).into_iter().collect(),
        live_target: replaced.as_ref().map(|report| report.target.clone()),
        backup_path: replaced.and_then(|report| report.backup_path),
    })
}

/// Write the Safari JSON forest, the Netscape HTML file, and import notes.
pub fn sync_to_safari(paths: &ResolvedPaths, now: DateTime<Local>) -> Result<SafariSyncReport> {
    let merged = load_forest(&require_stage_output(&paths.merged_dir, "merge")?)?;
    let forest = to_safari_forest(&merged);
    let json = to_safari_json(&forest)?;
    let html = render_netscape_html(&forest, now.timestamp())?;
    let stamp = timestamp_suffix(now);
    let dir = &paths.safari_sync_dir;

    clear_stage_dir(dir)?;
    let json_output = write_stage_output(dir, SAFARI_SNAPSHOT_PREFIX, "json", &json, &stamp)?;
    let html_output = write_stage_output(dir, SAFARI_SNAPSHOT_PREFIX, "html", &html, &stamp)?;
    let instructions_output = write_stage_output(
        dir,
        IMPORT_INSTRUCTIONS_PREFIX,
        "txt",
        IMPORT_INSTRUCTIONS,
        &stamp,
    )?;

    let bookmarks = count_forest(&merged).values().map(|counts| counts.urls).sum();
    info!(
        "event=stage_complete stage=sync_safari output={} bookmarks={bookmarks}",
        display_path(&html_output)
    );
    Ok(SafariSyncReport {
        json_output,
        html_output,
        instructions_output,
        bookmarks,
    })
}

/// Every stage in order, stopping at the first failure.
///
/// Both sources are parsed before any stage directory is cleared, so a missing
/// or malformed source leaves every stage output as it was.
pub fn run_all(
    paths: &ResolvedPaths,
    options: &RunOptions,
    now: DateTime<Local>,
) -> Result<RunReport> {
    let chrome = load_chrome_source(&options.chrome_source)?;
    let safari = load_safari_source(&options.safari_source)?;
    let chrome_snapshot = write_chrome_snapshot(paths, &chrome, now)?;
    let safari_snapshot = write_safari_snapshot(paths, &safari, now)?;
    let merged = merge_snapshots(paths, now)?;
    let chrome_sync = sync_to_chrome(paths, options.live_chrome.as_deref(), now)?;
    let safari_sync = sync_to_safari(paths, now)?;
    Ok(RunReport {
        chrome_snapshot,
        safari_snapshot,
        merged,
        chrome_sync,
        safari_sync,
    })
}

/// Read a forest written by a parse or merge stage.
pub fn load_forest(path: &Path) -> Result<Vec<BookmarkNode>> {
    let content =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Newest `.json` output in `dir`, or an error naming the command that produces it.
pub fn require_stage_output(dir: &Path, producer: &str) -> Result<PathBuf> {
    match latest_json_file(dir)? {
        Some(path) => Ok(path),
        None => bail!(
            "no stage output in {}; run `bookmark-sync {producer}` first",
            display_path(dir)
        ),
    }
}

fn write_forest_stage(
    stage: &'static str,
    dir: &Path,
    prefix: &str,
    forest: &[BookmarkNode],
    now: DateTime<Local>,
) -> Result<StageReport> {
    let json = serde_json::to_string_pretty(forest)
        .with_context(|| format!("failed to serialize {stage} output"))?;
    clear_stage_dir(dir)?;
    let output = write_stage_output(dir, prefix, "json", &json, &timestamp_suffix(now))?;
    let nodes = forest.iter().map(BookmarkNode::subtree_len).sum();

    info!(
        "event=stage_complete stage={stage} output={} top_level={} nodes={nodes}",
        display_path(&output),
        forest.len()
    );
    Ok(StageReport {
        stage,
        output,
        top_level: forest.len(),
        nodes,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::chrome_export::parse_chrome_projection;
    use crate::merge::SENTINEL_PATH;
    use crate::model::MAX_TREE_DEPTH;
    use crate::runtime::{InitOptions, init_layout};

    const CHROME_FIXTURE: &str = r#"{
        "checksum": "abc",
        "version": 1,
        "roots": {
            "bookmark_bar": {"type": "folder", "name": "Bookmarks bar", "children": [
                {"type": "url", "name": "Rust", "url": "https://www.rust-lang.org"}
            ]},
            "other": {"type": "folder", "name": "Other bookmarks", "children": []},
            "synced": {"type": "folder", "name": "Mobile bookmarks", "children": []}
        }
    }"#;

    fn initialized(root: &Path) -> ResolvedPaths {
        let paths = ResolvedPaths::for_project_root(root);
        init_layout(&paths, &InitOptions::default()).expect("init layout");
        paths
    }

    #[test]
    fn snapshot_chrome_writes_parsed_forest() {
        let temp = tempdir().expect("tempdir");
        let paths = initialized(temp.path());
        let source = temp.path().join("Bookmarks");
        fs::write(&source, CHROME_FIXTURE).expect("write fixture");

        let report = snapshot_chrome(&paths, &source, Local::now()).expect("snapshot");
        assert_eq!(report.top_level, 1);
        assert_eq!(report.nodes, 1);
        let forest = load_forest(&report.output).expect("load snapshot");
        assert_eq!(forest[0].name, "Rust");
        assert_eq!(forest[0].path, "Bookmarks Bar");
    }

    #[test]
    fn bad_source_keeps_previous_snapshot() {
        let temp = tempdir().expect("tempdir");
        let paths = initialized(temp.path());
        let source = temp.path().join("Bookmarks");
        fs::write(&source, CHROME_FIXTURE).expect("write fixture");
        let first = snapshot_chrome(&paths, &source, Local::now()).expect("snapshot");

        fs::write(&source, "{not json").expect("corrupt fixture");
        snapshot_chrome(&paths, &source, Local::now()).expect_err("corrupt source must fail");
        assert!(first.output.exists());
    }

    #[test]
    fn live_chrome_falls_back_to_the_chrome_source() {
        let source = PathBuf::from("/profiles/work/Bookmarks");
        let explicit = PathBuf::from("/tmp/Bookmarks");
        assert_eq!(
            resolve_live_chrome(true, None, Some(source.clone())),
            Some(source.clone())
        );
        assert_eq!(
            resolve_live_chrome(true, Some(explicit.clone()), Some(source.clone())),
            Some(explicit)
        );
        assert_eq!(resolve_live_chrome(false, None, Some(source)), None);
        assert_eq!(resolve_live_chrome(true, None, None), None);
    }

    #[test]
    fn deep_source_survives_snapshot_and_merge() {
        let temp = tempdir().expect("tempdir");
        let paths = initialized(temp.path());
        let levels = 200;
        let mut text = String::from(r#"{"roots": {"bookmark_bar": {"children": ["#);
        for _ in 0..levels {
            text.push_str(r#"{"type": "folder", "name": "f", "children": ["#);
        }
        text.push_str(r#"{"type": "url", "name": "deep", "url": "http://deep"}"#);
        for _ in 0..levels {
            text.push_str("]}");
        }
        text.push_str("]}}}");
        let source = temp.path().join("Bookmarks");
        fs::write(&source, text).expect("write deep fixture");

        let report = snapshot_chrome(&paths, &source, Local::now()).expect("snapshot");
        assert_eq!(report.nodes, MAX_TREE_DEPTH as usize + 1);
        load_forest(&report.output).expect("reload deep snapshot");

        write_safari_snapshot(&paths, &[], Local::now()).expect("empty safari snapshot");
        let merged = merge_snapshots(&paths, Local::now()).expect("merge");
        load_forest(&merged.output).expect("reload deep merge");
        let synced = sync_to_chrome(&paths, None, Local::now()).expect("project");
        let projected = fs::read(&synced.output).expect("read projection");
        parse_chrome_projection(&projected).expect("reparse deep projection");
    }

    #[test]
    fn merge_requires_both_snapshots() {
        let temp = tempdir().expect("tempdir");
        let paths = initialized(temp.path());
        let error = merge_snapshots(&paths, Local::now()).expect_err("nothing to merge");
        assert!(error.to_string().contains("parse chrome"));
    }

    #[test]
    fn merged_forest_reaches_safari_outputs() {
        let temp = tempdir().expect("tempdir");
        let paths = initialized(temp.path());
        let merged = merge_forests(
            vec![BookmarkNode::url("Rust", "https://www.rust-lang.org", "Bookmarks Bar", 0)],
            vec![BookmarkNode::url("LWN", "https://lwn.net", "", 0)],
        );
        let json = serde_json::to_string(&merged).expect("serialize");
        write_stage_output(&paths.merged_dir, MERGED_PREFIX, "json", &json, "20240101_000000")
            .expect("seed merged");

        let report = sync_to_safari(&paths, Local::now()).expect("sync safari");
        assert_eq!(report.bookmarks, 2);
        let html = fs::read_to_string(&report.html_output).expect("read html");
        assert_eq!(html.matches("<A HREF=").count(), 2);
        let notes = fs::read_to_string(&report.instructions_output).expect("read notes");
        assert_eq!(notes, IMPORT_INSTRUCTIONS);

        let merged_path = latest_json_file(&paths.merged_dir)
            .expect("lookup")
            .expect("merged output");
        let reloaded = load_forest(&merged_path).expect("reload merged");
        assert!(reloaded.iter().all(|node| node.path == SENTINEL_PATH));
    }
}
