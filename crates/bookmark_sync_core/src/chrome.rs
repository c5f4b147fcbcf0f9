use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::{
    BookmarkNode, DEFAULT_BOOKMARK_NAME, DEFAULT_FOLDER_NAME, MAX_TREE_DEPTH, join_path,
};

pub const BOOKMARK_BAR_ROOT: &str = "bookmark_bar";
pub const OTHER_ROOT: &str = "other";
pub const SYNCED_ROOT: &str = "synced";

pub const BOOKMARK_BAR_LABEL: &str = "Bookmarks Bar";
pub const OTHER_LABEL: &str = "Other Bookmarks";
pub const MOBILE_LABEL: &str = "Mobile Bookmarks";

/// Keys under `roots` that never hold a bookmark tree.
const NON_TREE_ROOT_KEYS: &[&str] = &["sync_transaction_version", "version"];

/// Canonical label recorded as the path of a root's direct children.
pub fn root_label(root_key: &str) -> Option<&'static str> {
    match root_key {
        BOOKMARK_BAR_ROOT => Some(BOOKMARK_BAR_LABEL),
        OTHER_ROOT => Some(OTHER_LABEL),
        SYNCED_ROOT => Some(MOBILE_LABEL),
        _ => None,
    }
}

/// Parse a whole Chromium `Bookmarks` file.
///
/// The decoder runs without a nesting limit on a growable stack, so a source
/// deeper than [`MAX_TREE_DEPTH`] is truncated by the walk instead of rejected.
pub fn parse_chrome_document(bytes: &[u8]) -> Result<Vec<BookmarkNode>> {
    let document = decode_unbounded(bytes).context("failed to decode Chrome bookmarks JSON")?;
    let roots = document
        .get("roots")
        .filter(|roots| roots.is_object())
        .ok_or_else(|| anyhow::anyhow!("Chrome bookmarks JSON has no `roots` object"))?;
    Ok(parse_chrome_roots(roots))
}

fn decode_unbounded(bytes: &[u8]) -> serde_json::Result<Value> {
    let mut json = serde_json::Deserializer::from_slice(bytes);
    json.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;
    Ok(value)
}

/// Walk every tree-valued entry of the `roots` mapping in document order.
pub fn parse_chrome_roots(roots: &Value) -> Vec<BookmarkNode> {
    let Some(roots) = roots.as_object() else {
        return Vec::new();
    };

    let mut forest = Vec::new();
    for (key, root) in roots {
        if NON_TREE_ROOT_KEYS.contains(&key.as_str()) {
            continue;
        }
        let Some(root) = root.as_object() else {
            continue;
        };
        let label = root_label(key)
            .map(str::to_string)
            .or_else(|| non_empty_str(root, "name").map(str::to_string))
            .unwrap_or_else(|| key.clone());
        let before = forest.len();
        forest.extend(parse_children(root, &label, 0));
        debug!(
            "event=chrome_root_parsed root={key} label={label} top_level={}",
            forest.len() - before
        );
    }
    forest
}

fn parse_children(folder: &Map<String, Value>, path: &str, depth: u32) -> Vec<BookmarkNode> {
    let Some(children) = folder.get("children").and_then(Value::as_array) else {
        return Vec::new();
    };
    if depth > MAX_TREE_DEPTH {
        warn!(
            "event=chrome_depth_exceeded path={path} dropped_children={}",
            children.len()
        );
        return Vec::new();
    }
    children
        .iter()
        .filter_map(|child| parse_node(child, path, depth))
        .collect()
}

fn parse_node(node: &Value, path: &str, depth: u32) -> Option<BookmarkNode> {
    let node = node.as_object()?;
    match node.get("type").and_then(Value::as_str)? {
        "folder" => {
            let name = non_empty_str(node, "name").unwrap_or(DEFAULT_FOLDER_NAME);
            let children = parse_children(node, &join_path(path, name), depth + 1);
            Some(BookmarkNode::folder(name, path, depth, children))
        }
        "url" => {
            let name = non_empty_str(node, "name").unwrap_or(DEFAULT_BOOKMARK_NAME);
            let url = node.get("url").and_then(Value::as_str).unwrap_or("");
            Some(BookmarkNode::url(name, url, path, depth))
        }
        _ => None,
    }
}

fn non_empty_str<'a>(node: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    node.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}
