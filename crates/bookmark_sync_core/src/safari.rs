use std::io::Cursor;

use anyhow::{Context, Result};
use log::warn;
use plist::{Dictionary, Value};

use crate::model::{
    BookmarkNode, DEFAULT_BOOKMARK_NAME, DEFAULT_FOLDER_NAME, MAX_TREE_DEPTH, join_path,
};

pub const FOLDER_TYPE: &str = "WebBookmarkTypeList";
pub const LEAF_TYPE: &str = "WebBookmarkTypeLeaf";

/// System folders whose children are lifted into the enclosing folder.
pub const SKIPPED_FOLDERS: &[&str] = &[
    "com.apple.ReadingList",
    "BookmarksMenu",
    "BookmarksBar",
    "Menu",
];

/// Decode a `Bookmarks.plist` (binary or XML) and parse it.
pub fn parse_safari_document(bytes: &[u8]) -> Result<Vec<BookmarkNode>> {
    let root = Value::from_reader(Cursor::new(bytes))
        .context("failed to decode Safari bookmarks plist")?;
    Ok(parse_safari_tree(&root))
}

/// Parse the decoded plist root. The root container itself is never emitted.
pub fn parse_safari_tree(root: &Value) -> Vec<BookmarkNode> {
    let mut forest = Vec::new();
    if let Some(root) = root.as_dictionary() {
        walk_children(root, "", 0, &mut forest);
    }
    forest
}

fn walk_children(folder: &Dictionary, path: &str, depth: u32, out: &mut Vec<BookmarkNode>) {
    let Some(children) = folder.get("Children").and_then(Value::as_array) else {
        return;
    };
    if depth > MAX_TREE_DEPTH {
        warn!(
            "event=safari_depth_exceeded path={path} dropped_children={}",
            children.len()
        );
        return;
    }
    for child in children {
        if let Some(entry) = child.as_dictionary() {
            walk_entry(entry, path, depth, out);
        }
    }
}

fn walk_entry(entry: &Dictionary, path: &str, depth: u32, out: &mut Vec<BookmarkNode>) {
    match entry.get("WebBookmarkType").and_then(Value::as_string) {
        Some(FOLDER_TYPE) => {
            let title = non_empty_string(entry, "Title");
            if title.is_some_and(|title| SKIPPED_FOLDERS.contains(&title)) {
                walk_children(entry, path, depth, out);
                return;
            }
            let name = title.unwrap_or(DEFAULT_FOLDER_NAME);
            let mut children = Vec::new();
            walk_children(entry, &join_path(path, name), depth + 1, &mut children);
            out.push(BookmarkNode::folder(name, path, depth, children));
        }
        Some(LEAF_TYPE) => {
            let Some(url) = entry.get("URLString").and_then(Value::as_string) else {
                return;
            };
            out.push(BookmarkNode::url(leaf_title(entry), url, path, depth));
        }
        _ => {}
    }
}

fn leaf_title(entry: &Dictionary) -> &str {
    entry
        .get("URIDictionary")
        .and_then(Value::as_dictionary)
        .and_then(|uri| non_empty_string(uri, "title"))
        .or_else(|| non_empty_string(entry, "Title"))
        .unwrap_or(DEFAULT_BOOKMARK_NAME)
}

fn non_empty_string<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a str> {
    dict.get(key)
        .and_then(Value::as_string)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: Vec<(&str, Value)>) -> Value {
        let mut dict = Dictionary::new();
        for (key, value) in entries {
            dict.insert(key.to_string(), value);
        }
        Value::Dictionary(dict)
    }

    fn folder(title: &str, children: Vec<Value>) -> Value {
        dict(vec![
            ("WebBookmarkType", Value::String(FOLDER_TYPE.to_string())),
            ("Title", Value::String(title.to_string())),
            ("Children", Value::Array(children)),
        ])
    }

    fn leaf(url: &str, title: &str) -> Value {
        dict(vec![
            ("WebBookmarkType", Value::String(LEAF_TYPE.to_string())),
            ("URLString", Value::String(url.to_string())),
            ("Title", Value::String(title.to_string())),
        ])
    }

    fn root(children: Vec<Value>) -> Value {
        folder("", children)
    }

    #[test]
    fn skipped_folder_is_flattened_into_parent() {
        let tree = root(vec![folder("BookmarksBar", vec![leaf("http://b", "B")])]);
        let forest = parse_safari_tree(&tree);
        assert_eq!(forest.len(), 1);
        assert!(!forest[0].is_folder());
        assert_eq!(forest[0].name, "B");
        assert_eq!(forest[0].url_str(), Some("http://b"));
        assert_eq!(forest[0].path, "");
        assert_eq!(forest[0].depth, 0);
    }

    #[test]
    fn skipped_folder_children_keep_their_position() {
        let tree = root(vec![
            leaf("http://first", "First"),
            folder(
                "BookmarksMenu",
                vec![leaf("http://menu-a", "MenuA"), leaf("http://menu-b", "MenuB")],
            ),
            leaf("http://last", "Last"),
        ]);
        let names: Vec<String> = parse_safari_tree(&tree)
            .into_iter()
            .map(|node| node.name)
            .collect();
        assert_eq!(names, vec!["First", "MenuA", "MenuB", "Last"]);
    }

    #[test]
    fn regular_folders_nest_with_path_and_depth() {
        let tree = root(vec![folder(
            "BookmarksBar",
            vec![folder("News", vec![folder("Tech", vec![leaf("http://lwn.net", "LWN")])])],
        )]);
        let forest = parse_safari_tree(&tree);
        let news = &forest[0];
        assert_eq!(news.name, "News");
        assert_eq!(news.path, "");
        assert_eq!(news.depth, 0);
        let tech = &news.children().expect("news children")[0];
        assert_eq!(tech.path, "News");
        assert_eq!(tech.depth, 1);
        let lwn = &tech.children().expect("tech children")[0];
        assert_eq!(lwn.path, "News/Tech");
        assert_eq!(lwn.depth, 2);
    }

    #[test]
    fn sibling_folders_with_the_same_title_stay_separate() {
        let tree = root(vec![
            folder("Work", vec![leaf("http://a", "A")]),
            folder("Work", vec![leaf("http://b", "B")]),
        ]);
        let forest = parse_safari_tree(&tree);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].children().expect("first")[0].name, "A");
        assert_eq!(forest[1].children().expect("second")[0].name, "B");
    }

    #[test]
    fn leaf_title_prefers_uri_dictionary() {
        let with_uri = dict(vec![
            ("WebBookmarkType", Value::String(LEAF_TYPE.to_string())),
            ("URLString", Value::String("http://u".to_string())),
            ("Title", Value::String("Fallback".to_string())),
            (
                "URIDictionary",
                dict(vec![("title", Value::String("Preferred".to_string()))]),
            ),
        ]);
        let empty_uri = dict(vec![
            ("WebBookmarkType", Value::String(LEAF_TYPE.to_string())),
            ("URLString", Value::String("http://v".to_string())),
            ("Title", Value::String("Fallback".to_string())),
            ("URIDictionary", dict(vec![("title", Value::String(String::new()))])),
        ]);
        let untitled = dict(vec![
            ("WebBookmarkType", Value::String(LEAF_TYPE.to_string())),
            ("URLString", Value::String("http://w".to_string())),
        ]);
        let forest = parse_safari_tree(&root(vec![with_uri, empty_uri, untitled]));
        let names: Vec<&str> = forest.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, vec!["Preferred", "Fallback", DEFAULT_BOOKMARK_NAME]);
    }

    #[test]
    fn leaves_without_url_and_unknown_entries_are_dropped() {
        let no_url = dict(vec![
            ("WebBookmarkType", Value::String(LEAF_TYPE.to_string())),
            ("Title", Value::String("Orphan".to_string())),
        ]);
        let proxy = dict(vec![
            ("WebBookmarkType", Value::String("WebBookmarkTypeProxy".to_string())),
            ("Title", Value::String("History".to_string())),
        ]);
        let tree = root(vec![
            no_url,
            proxy,
            Value::String("noise".to_string()),
            leaf("http://kept", "Kept"),
        ]);
        let forest = parse_safari_tree(&tree);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].name, "Kept");
    }

    #[test]
    fn untitled_folder_gets_default_name() {
        let untitled = dict(vec![
            ("WebBookmarkType", Value::String(FOLDER_TYPE.to_string())),
            ("Children", Value::Array(vec![leaf("http://x", "X")])),
        ]);
        let forest = parse_safari_tree(&root(vec![untitled]));
        assert_eq!(forest[0].name, DEFAULT_FOLDER_NAME);
        assert_eq!(forest[0].children().expect("children")[0].path, DEFAULT_FOLDER_NAME);
    }

    #[test]
    fn xml_plist_document_is_decoded() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Children</key>
    <array>
        <dict>
            <key>Title</key>
            <string>com.apple.ReadingList</string>
            <key>WebBookmarkType</key>
            <string>WebBookmarkTypeList</string>
            <key>Children</key>
            <array>
                <dict>
                    <key>URLString</key>
                    <string>https://example.org/later</string>
                    <key>URIDictionary</key>
                    <dict>
                        <key>title</key>
                        <string>Read Later</string>
                    </dict>
                    <key>WebBookmarkType</key>
                    <string>WebBookmarkTypeLeaf</string>
                </dict>
            </array>
        </dict>
    </array>
    <key>Title</key>
    <string></string>
    <key>WebBookmarkType</key>
    <string>WebBookmarkTypeList</string>
</dict>
</plist>"#;
        let forest = parse_safari_document(xml).expect("parse plist");
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].name, "Read Later");
        assert_eq!(forest[0].url_str(), Some("https://example.org/later"));
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        let truncated = b"<plist version=\"1.0\"><dict><key>Children</key>";
        let error = parse_safari_document(truncated).expect_err("must fail");
        assert!(error.to_string().contains("Safari bookmarks plist"));
    }
}
