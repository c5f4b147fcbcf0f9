use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FOLDER_NAME: &str = "Unnamed Folder";
pub const DEFAULT_BOOKMARK_NAME: &str = "Unnamed Bookmark";

/// Parsers stop descending past this many folder levels. Every document written
/// from a bounded tree nests well inside `serde_json`'s default limit of 128.
pub const MAX_TREE_DEPTH: u32 = 48;

/// Which browser a node was read from. Assigned during merge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Source {
    Chrome,
    Safari,
    #[default]
    Unknown,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Safari => "Safari",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Folder { children: Vec<BookmarkNode> },
    Url { url: String },
}

/// One folder or bookmark in the common tree model.
///
/// Serializes to the intermediate merged representation:
/// `{type, name, url?, children?, path, depth, source?, original_path?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub name: String,
    pub path: String,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Source::is_unknown")]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_path: Option<String>,
}

impl BookmarkNode {
    pub fn folder(
        name: impl Into<String>,
        path: impl Into<String>,
        depth: u32,
        children: Vec<BookmarkNode>,
    ) -> Self {
        Self {
            kind: NodeKind::Folder { children },
            name: non_empty_or(name.into(), DEFAULT_FOLDER_NAME),
            path: path.into(),
            depth,
            source: Source::Unknown,
            original_path: None,
        }
    }

    pub fn url(
        name: impl Into<String>,
        url: impl Into<String>,
        path: impl Into<String>,
        depth: u32,
    ) -> Self {
        Self {
            kind: NodeKind::Url { url: url.into() },
            name: non_empty_or(name.into(), DEFAULT_BOOKMARK_NAME),
            path: path.into(),
            depth,
            source: Source::Unknown,
            original_path: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    pub fn url_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Url { url } => Some(url),
            NodeKind::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&[BookmarkNode]> {
        match &self.kind {
            NodeKind::Folder { children } => Some(children),
            NodeKind::Url { .. } => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<BookmarkNode>> {
        match &mut self.kind {
            NodeKind::Folder { children } => Some(children),
            NodeKind::Url { .. } => None,
        }
    }

    pub fn original_path(&self) -> Option<&str> {
        self.original_path.as_deref()
    }

    /// Records the current `path` as the original path. Later calls are no-ops.
    pub fn capture_original_path(&mut self) {
        if self.original_path.is_none() {
            self.original_path = Some(self.path.clone());
        }
    }

    /// `original_path` when captured, the live `path` otherwise.
    pub fn routing_path(&self) -> &str {
        self.original_path.as_deref().unwrap_or(&self.path)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self
            .children()
            .map(|children| children.iter().map(BookmarkNode::subtree_len).sum())
            .unwrap_or(0)
    }
}

/// Joins a parent path and a folder name with `/`.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
