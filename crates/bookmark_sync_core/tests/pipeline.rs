use std::fs;
use std::path::Path;

use bookmark_sync_core::chrome::parse_chrome_document;
use bookmark_sync_core::pipeline::{RunOptions, load_forest, run_all};
use bookmark_sync_core::runtime::{InitOptions, ResolvedPaths, init_layout};
use bookmark_sync_core::stats::{count_forest, leaf_pairs, verify_normalized};
use chrono::Local;
use tempfile::tempdir;

const CHROME_BOOKMARKS: &str = r#"{
    "checksum": "0f1e2d",
    "roots": {
        "bookmark_bar": {
            "type": "folder", "name": "Bookmarks bar", "id": "1",
            "children": [
                {"type": "folder", "name": "Dev", "id": "4", "children": [
                    {"type": "url", "name": "c-crates", "url": "https://crates.io", "id": "5"},
                    {"type": "url", "name": "c-docs", "url": "https://docs.rs", "id": "6"}
                ]},
                {"type": "url", "name": "c-rust", "url": "https://www.rust-lang.org", "id": "7"}
            ]
        },
        "other": {
            "type": "folder", "name": "Other bookmarks", "id": "2",
            "children": [
                {"type": "url", "name": "c-mail", "url": "https://mail.example", "id": "8"}
            ]
        },
        "synced": {
            "type": "folder", "name": "Mobile bookmarks", "id": "3",
            "children": [
                {"type": "url", "name": "c-phone", "url": "https://m.example", "id": "9"}
            ]
        }
    },
    "version": 1
}"#;

const SAFARI_BOOKMARKS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>WebBookmarkType</key><string>WebBookmarkTypeList</string>
    <key>Children</key>
    <array>
        <dict>
            <key>WebBookmarkType</key><string>WebBookmarkTypeList</string>
            <key>Title</key><string>BookmarksBar</string>
            <key>Children</key>
            <array>
                <dict>
                    <key>WebBookmarkType</key><string>WebBookmarkTypeLeaf</string>
                    <key>URLString</key><string>https://lwn.net</string>
                    <key>URIDictionary</key>
                    <dict><key>title</key><string>s-lwn</string></dict>
                </dict>
            </array>
        </dict>
        <dict>
            <key>WebBookmarkType</key><string>WebBookmarkTypeList</string>
            <key>Title</key><string>Reading</string>
            <key>Children</key>
            <array>
                <dict>
                    <key>WebBookmarkType</key><string>WebBookmarkTypeLeaf</string>
                    <key>URLString</key><string>https://news.ycombinator.com</string>
                    <key>Title</key><string>s-hn</string>
                </dict>
            </array>
        </dict>
    </array>
</dict>
</plist>"#;

fn fixture(root: &Path) -> (ResolvedPaths, RunOptions) {
    let paths = ResolvedPaths::for_project_root(root);
    init_layout(&paths, &InitOptions::default()).expect("init layout");

    let chrome = root.join("Bookmarks");
    let safari = root.join("Bookmarks.plist");
    fs::write(&chrome, CHROME_BOOKMARKS).expect("write chrome fixture");
    fs::write(&safari, SAFARI_BOOKMARKS).expect("write safari fixture");

    let options = RunOptions {
        chrome_source: chrome.clone(),
        safari_source: safari,
        live_chrome: Some(chrome),
    };
    (paths, options)
}

fn names_with_prefix(pairs: &[(String, String)], prefix: &str) -> Vec<String> {
    pairs
        .iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .map(|(name, _)| name.clone())
        .collect()
}

#[test]
fn full_run_round_trips_through_live_chrome_file() {
    let temp = tempdir().expect("tempdir");
    let (paths, options) = fixture(temp.path());

    let report = run_all(&paths, &options, Local::now()).expect("run pipeline");
    assert_eq!(report.chrome_snapshot.nodes, 6);
    assert_eq!(report.safari_snapshot.top_level, 2);

    let merged = load_forest(&report.merged.output).expect("load merged");
    assert_eq!(verify_normalized(&merged), None);
    let counts = count_forest(&merged);
    assert_eq!(counts["Chrome"].urls, 5);
    assert_eq!(counts["Safari"].urls, 2);

    let live = fs::read(options.live_chrome.as_ref().expect("live target")).expect("read live");
    let reparsed = parse_chrome_document(&live).expect("reparse projected document");

    let mut before = leaf_pairs(&merged);
    let mut after = leaf_pairs(&reparsed);
    assert_eq!(
        names_with_prefix(&after, "c-"),
        ["c-crates", "c-docs", "c-rust", "c-mail", "c-phone"]
    );
    assert_eq!(names_with_prefix(&after, "s-"), ["s-lwn", "s-hn"]);
    before.sort();
    after.sort();
    assert_eq!(before, after);

    let backup = report.chrome_sync.backup_path.expect("backup path");
    assert!(backup.starts_with(&paths.backups_dir));
    assert_eq!(
        fs::read_to_string(backup).expect("read backup"),
        CHROME_BOOKMARKS
    );

    let html = fs::read_to_string(&report.safari_sync.html_output).expect("read html");
    assert_eq!(html.matches("<A HREF=").count(), 7);
    assert_eq!(html.matches("<DL><p>").count(), html.matches("</DL><p>").count());
}

#[test]
fn missing_safari_source_leaves_live_chrome_untouched() {
    let temp = tempdir().expect("tempdir");
    let (paths, mut options) = fixture(temp.path());
    options.safari_source = temp.path().join("absent.plist");

    let error = run_all(&paths, &options, Local::now()).expect_err("run must fail");
    assert!(error.to_string().contains("Safari bookmarks file not found"));

    let live = fs::read_to_string(options.live_chrome.as_ref().expect("live target"))
        .expect("read live");
    assert_eq!(live, CHROME_BOOKMARKS);
    for dir in paths.stage_dirs() {
        assert!(
            fs::read_dir(dir).expect("list stage dir").next().is_none(),
            "{} must stay empty",
            dir.display()
        );
    }
}

#[test]
fn failed_rerun_keeps_every_previous_snapshot() {
    let temp = tempdir().expect("tempdir");
    let (paths, mut options) = fixture(temp.path());
    let first = run_all(&paths, &options, Local::now()).expect("first run");

    fs::write(&options.safari_source, "not a plist").expect("corrupt safari fixture");
    options.live_chrome = None;
    run_all(&paths, &options, Local::now()).expect_err("corrupt source must fail");

    assert!(first.chrome_snapshot.output.exists());
    assert!(first.safari_snapshot.output.exists());
    assert!(first.merged.output.exists());
}
