use std::collections::BTreeMap;

use serde::Serialize;

use crate::chrome_export::{ChromeDocument, ChromeNode};
use crate::merge::SENTINEL_PATH;
use crate::model::{BookmarkNode, NodeKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub folders: usize,
    pub urls: usize,
}

impl NodeCounts {
    pub fn total(&self) -> usize {
        self.folders + self.urls
    }

    fn add(&mut self, other: NodeCounts) {
        self.folders += other.folders;
        self.urls += other.urls;
    }
}

/// Folder/URL counts keyed by provenance tag.
pub fn count_forest(forest: &[BookmarkNode]) -> BTreeMap<String, NodeCounts> {
    let mut by_source = BTreeMap::new();
    for node in forest {
        count_node(node, &mut by_source);
    }
    by_source
}

fn count_node(node: &BookmarkNode, by_source: &mut BTreeMap<String, NodeCounts>) {
    let counts: &mut NodeCounts = by_source.entry(node.source.as_str().to_string()).or_default();
    match &node.kind {
        NodeKind::Url { .. } => counts.urls += 1,
        NodeKind::Folder { children } => {
            counts.folders += 1;
            for child in children {
                count_node(child, by_source);
            }
        }
    }
}

/// Folder/URL counts under each Chrome root. The root folders themselves are not counted.
pub fn count_chrome_document(document: &ChromeDocument) -> BTreeMap<String, NodeCounts> {
    document
        .roots
        .iter()
        .map(|(root, node)| {
            let mut counts = NodeCounts::default();
            for child in node.children() {
                counts.add(count_chrome_node(child));
            }
            (root.key().to_string(), counts)
        })
        .collect()
}

fn count_chrome_node(node: &ChromeNode) -> NodeCounts {
    match node {
        ChromeNode::Url(_) => NodeCounts { folders: 0, urls: 1 },
        ChromeNode::Folder(folder) => {
            let mut counts = NodeCounts { folders: 1, urls: 0 };
            for child in &folder.children {
                counts.add(count_chrome_node(child));
            }
            counts
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizationViolation {
    pub name: String,
    pub path: String,
    pub depth: u32,
}

/// First node (pre-order) whose path or depth was not normalized.
pub fn verify_normalized(forest: &[BookmarkNode]) -> Option<NormalizationViolation> {
    for node in forest {
        if node.path != SENTINEL_PATH || node.depth != 0 {
            return Some(NormalizationViolation {
                name: node.name.clone(),
                path: node.path.clone(),
                depth: node.depth,
            });
        }
        if let Some(violation) = node.children().and_then(verify_normalized) {
            return Some(violation);
        }
    }
    None
}

/// `(name, url)` of every bookmark in pre-order.
pub fn leaf_pairs(forest: &[BookmarkNode]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    collect_leaf_pairs(forest, &mut pairs);
    pairs
}

fn collect_leaf_pairs(forest: &[BookmarkNode], pairs: &mut Vec<(String, String)>) {
    for node in forest {
        match &node.kind {
            NodeKind::Url { url } => pairs.push((node.name.clone(), url.clone())),
            NodeKind::Folder { children } => collect_leaf_pairs(children, pairs),
        }
    }
}

/// `(name, url)` of every bookmark in a Chrome document, roots in schema order.
pub fn chrome_leaf_pairs(document: &ChromeDocument) -> Vec<(String, String)> {
    fn walk(node: &ChromeNode, pairs: &mut Vec<(String, String)>) {
        match node {
            ChromeNode::Url(url) => pairs.push((url.name.clone(), url.url.clone())),
            ChromeNode::Folder(folder) => {
                for child in &folder.children {
                    walk(child, pairs);
                }
            }
        }
    }

    let mut pairs = Vec::new();
    for (_, root) in document.roots.iter() {
        walk(root, &mut pairs);
    }
    pairs
}
