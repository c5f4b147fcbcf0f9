use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::chrome::{BOOKMARK_BAR_LABEL, MOBILE_LABEL, OTHER_LABEL};
use crate::model::{BookmarkNode, NodeKind, Source};

/// Folder names that already denote a Chrome root and are never nested under one.
pub const CANONICAL_ROOT_NAMES: [&str; 3] = [BOOKMARK_BAR_LABEL, OTHER_LABEL, MOBILE_LABEL];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeDocument {
    pub checksum: String,
    pub version: u32,
    pub roots: ChromeRoots,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeRoots {
    pub bookmark_bar: ChromeNode,
    pub other: ChromeNode,
    pub synced: ChromeNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChromeNode {
    Folder(ChromeFolder),
    Url(ChromeUrl),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeFolder {
    pub children: Vec<ChromeNode>,
    #[serde(default)]
    pub date_added: String,
    #[serde(default)]
    pub date_modified: String,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChromeUrl {
    #[serde(default)]
    pub date_added: String,
    pub id: String,
    pub name: String,
    pub url: String,
}

impl ChromeNode {
    pub fn children(&self) -> &[ChromeNode] {
        match self {
            Self::Folder(folder) => &folder.children,
            Self::Url(_) => &[],
        }
    }
}

impl ChromeRoots {
    pub fn iter(&self) -> impl Iterator<Item = (ChromeRoot, &ChromeNode)> {
        [
            (ChromeRoot::BookmarkBar, &self.bookmark_bar),
            (ChromeRoot::Other, &self.other),
            (ChromeRoot::Synced, &self.synced),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChromeRoot {
    BookmarkBar,
    Other,
    Synced,
}

impl ChromeRoot {
    pub fn key(self) -> &'static str {
        match self {
            Self::BookmarkBar => "bookmark_bar",
            Self::Other => "other",
            Self::Synced => "synced",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BookmarkBar => BOOKMARK_BAR_LABEL,
            Self::Other => OTHER_LABEL,
            Self::Synced => MOBILE_LABEL,
        }
    }

    fn id(self) -> &'static str {
        match self {
            Self::BookmarkBar => "1",
            Self::Other => "2",
            Self::Synced => "3",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::BookmarkBar => 0,
            Self::Other => 1,
            Self::Synced => 2,
        }
    }
}

/// Destination root for a top-level node of a merged forest.
pub fn route(node: &BookmarkNode) -> ChromeRoot {
    match node.source {
        Source::Chrome => match node.routing_path() {
            OTHER_LABEL => ChromeRoot::Other,
            MOBILE_LABEL => ChromeRoot::Synced,
            _ => ChromeRoot::BookmarkBar,
        },
        Source::Safari | Source::Unknown => ChromeRoot::Other,
    }
}

/// Rebuilds the three-root Chromium schema from a merged forest.
///
/// Identifiers and timestamps come from one counter seeded at construction, so they
/// are unique within a single projector but not across projectors.
#[derive(Debug)]
pub struct ChromeProjector {
    seed: u64,
    emitted: u64,
}

impl Default for ChromeProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChromeProjector {
    pub fn new() -> Self {
        Self::with_seed(now_micros())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed, emitted: 0 }
    }

    pub fn project(&mut self, forest: &[BookmarkNode]) -> ChromeDocument {
        let mut roots: [Vec<ChromeNode>; 3] = Default::default();
        for node in forest {
            self.project_into(node, &mut roots[route(node).index()]);
        }

        let [bookmark_bar, other, synced] = roots;
        info!(
            "event=chrome_projected bookmark_bar={} other={} synced={} emitted={}",
            bookmark_bar.len(),
            other.len(),
            synced.len(),
            self.emitted
        );
        ChromeDocument {
            checksum: String::new(),
            version: 1,
            roots: ChromeRoots {
                bookmark_bar: self.root_folder(ChromeRoot::BookmarkBar, bookmark_bar),
                other: self.root_folder(ChromeRoot::Other, other),
                synced: self.root_folder(ChromeRoot::Synced, synced),
            },
        }
    }

    /// Project `node` into `container`. A folder named like a canonical root
    /// is dissolved in position at any depth.
    fn project_into(&mut self, node: &BookmarkNode, container: &mut Vec<ChromeNode>) {
        if let NodeKind::Folder { children } = &node.kind
            && CANONICAL_ROOT_NAMES.contains(&node.name.as_str())
        {
            for child in children {
                self.project_into(child, container);
            }
            return;
        }
        let projected = self.project_node(node);
        container.push(projected);
    }

    fn project_node(&mut self, node: &BookmarkNode) -> ChromeNode {
        let stamp = self.next_stamp();
        match &node.kind {
            NodeKind::Url { url } => ChromeNode::Url(ChromeUrl {
                date_added: stamp.clone(),
                id: stamp,
                name: node.name.clone(),
                url: url.clone(),
            }),
            NodeKind::Folder { children } => {
                let mut projected = Vec::with_capacity(children.len());
                for child in children {
                    self.project_into(child, &mut projected);
                }
                ChromeNode::Folder(ChromeFolder {
                    children: projected,
                    date_added: stamp.clone(),
                    date_modified: stamp.clone(),
                    id: stamp,
                    name: node.name.clone(),
                })
            }
        }
    }

    fn root_folder(&self, root: ChromeRoot, children: Vec<ChromeNode>) -> ChromeNode {
        ChromeNode::Folder(ChromeFolder {
            children,
            date_added: self.seed.to_string(),
            date_modified: self.seed.to_string(),
            id: root.id().to_string(),
            name: root.label().to_string(),
        })
    }

    fn next_stamp(&mut self) -> String {
        // Widened so a seed near u64::MAX still yields distinct stamps.
        let value = u128::from(self.seed) + u128::from(self.emitted);
        self.emitted += 1;
        value.to_string()
    }
}

pub fn to_chrome_json(document: &ChromeDocument) -> Result<String> {
    serde_json::to_string_pretty(document).context("failed to serialize Chrome bookmarks")
}

pub fn parse_chrome_projection(bytes: &[u8]) -> Result<ChromeDocument> {
    serde_json::from_slice(bytes).context("failed to decode projected Chrome bookmarks")
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_micros() as u64)
        .unwrap_or_default()
}
