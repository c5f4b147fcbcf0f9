use log::info;

use crate::model::{BookmarkNode, Source};

/// Path written to every node by [`normalize`].
pub const SENTINEL_PATH: &str = "Bookmarks Bar";

/// Set `source` on `node` and every descendant.
pub fn tag_source(node: &mut BookmarkNode, source: Source) {
    node.source = source;
    if let Some(children) = node.children_mut() {
        for child in children {
            tag_source(child, source);
        }
    }
}

/// Capture the parse-time path once, then reset `path` and `depth` to the sentinel values.
///
/// Running it again leaves the captured `original_path` untouched.
pub fn normalize(node: &mut BookmarkNode) {
    node.capture_original_path();
    node.path = SENTINEL_PATH.to_string();
    node.depth = 0;
    if let Some(children) = node.children_mut() {
        for child in children {
            normalize(child);
        }
    }
}

/// Tag, normalize and concatenate the two forests (Chrome first).
pub fn merge_forests(
    mut chrome: Vec<BookmarkNode>,
    mut safari: Vec<BookmarkNode>,
) -> Vec<BookmarkNode> {
    for node in &mut chrome {
        tag_source(node, Source::Chrome);
    }
    for node in &mut safari {
        tag_source(node, Source::Safari);
    }
    for node in chrome.iter_mut().chain(safari.iter_mut()) {
        normalize(node);
    }

    info!(
        "event=forests_merged chrome_top_level={} safari_top_level={}",
        chrome.len(),
        safari.len()
    );
    chrome.append(&mut safari);
    chrome
}
