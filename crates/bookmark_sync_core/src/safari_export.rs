use std::fmt::{self, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{BookmarkNode, NodeKind};

const INDENT: &str = "    ";

const NETSCAPE_HEADER: &str = "<!DOCTYPE NETSCAPE-Bookmark-file-1>
<!-- This is an automatically generated file.
     It will be read and overwritten.
     DO NOT EDIT! -->
<META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=UTF-8\">
<TITLE>Bookmarks</TITLE>
<H1>Bookmarks</H1>
<DL><p>
";

pub const IMPORT_INSTRUCTIONS: &str = "How to import these bookmarks into Safari

Option 1 - HTML file (recommended):
1. Open Safari.
2. Choose File > Import From > Bookmarks HTML File...
3. Select the safari_bookmarks_<timestamp>.html file in this directory.
4. Click Import.

Option 2 - manual:
1. In Safari, choose Bookmarks > Edit Bookmarks.
2. Recreate the structure listed in the JSON file from this directory.

Notes:
- Safari does not allow its bookmark store to be modified by other programs,
  so the HTML import is the supported path.
- The JSON file is kept for reference and backup only.
";

/// Safari-side forest with the Chrome-only fields removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SafariNode {
    Folder {
        name: String,
        children: Vec<SafariNode>,
    },
    Url {
        name: String,
        url: String,
        source: String,
    },
}

pub fn to_safari_forest(forest: &[BookmarkNode]) -> Vec<SafariNode> {
    forest.iter().map(to_safari_node).collect()
}

fn to_safari_node(node: &BookmarkNode) -> SafariNode {
    match &node.kind {
        NodeKind::Folder { children } => SafariNode::Folder {
            name: node.name.clone(),
            children: to_safari_forest(children),
        },
        NodeKind::Url { url } => SafariNode::Url {
            name: node.name.clone(),
            url: url.clone(),
            source: if node.source.is_unknown() {
                String::new()
            } else {
                node.source.as_str().to_string()
            },
        },
    }
}

pub fn to_safari_json(forest: &[SafariNode]) -> Result<String> {
    serde_json::to_string_pretty(forest).context("failed to serialize Safari bookmarks")
}

/// Render a Netscape bookmark file. Every bookmark gets `add_date` (unix seconds).
pub fn render_netscape_html(forest: &[SafariNode], add_date: i64) -> Result<String> {
    let mut html = String::from(NETSCAPE_HEADER);
    render_items(&mut html, forest, 1, add_date).context("failed to render Netscape bookmarks")?;
    html.push_str("</DL><p>");
    Ok(html)
}

fn render_items<W: Write>(
    out: &mut W,
    items: &[SafariNode],
    level: usize,
    add_date: i64,
) -> fmt::Result {
    let indent = INDENT.repeat(level);
    for item in items {
        match item {
            SafariNode::Folder { name, children } => {
                writeln!(out, "{indent}<DT><H3>{}</H3>", escape_html(name))?;
                writeln!(out, "{indent}<DL><p>")?;
                render_items(out, children, level + 1, add_date)?;
                writeln!(out, "{indent}</DL><p>")?;
            }
            SafariNode::Url { name, url, source } => {
                writeln!(
                    out,
                    "{indent}<DT><A HREF=\"{}\" ADD_DATE=\"{add_date}\" SOURCE=\"{}\">{}</A>",
                    escape_html(url),
                    escape_html(source),
                    escape_html(name)
                )?;
            }
        }
    }
    Ok(())
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
