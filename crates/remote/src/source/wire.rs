//! Response shapes of the remote API and their conversion into the document
//! model.

use super::NodeBatch;
use figpack_extract::{Document, Node, NodeKind, Page};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub(crate) struct FileResponse {
    #[serde(default)]
    version: Option<String>,
    document: WireNode,
}
impl From<FileResponse> for Document {
    fn from(response: FileResponse) -> Self {
        let pages = response
            .document
            .children
            .into_iter()
            .map(|page| Page::new(page.id, page.name, page.children.into_iter().map(Node::from).collect()))
            .collect();
        Document::new(response.version.unwrap_or_default(), pages)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct NodesResponse {
    #[serde(default)]
    nodes: HashMap<String, Option<NodeEntry>>,
}
impl From<NodesResponse> for NodeBatch {
    fn from(response: NodesResponse) -> Self {
        response
            .nodes
            .into_iter()
            .filter_map(|(id, entry)| entry.and_then(|entry| entry.document).map(|node| (id, Node::from(node))))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    document: Option<WireNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireNode {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    node_type: String,
    #[serde(default)]
    characters: Option<String>,
    #[serde(default)]
    fills: Vec<Paint>,
    #[serde(default)]
    has_image_fill: Option<bool>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    frame_name: Option<String>,
    #[serde(default)]
    children: Vec<WireNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paint {
    #[serde(rename = "type")]
    paint_type: String,
    #[serde(default)]
    visible: Option<bool>,
    #[serde(default)]
    image_ref: Option<String>,
}
impl Paint {
    fn is_visible_image(&self) -> bool {
        self.paint_type.eq_ignore_ascii_case("IMAGE") && self.visible.unwrap_or(true)
    }
}

impl From<WireNode> for Node {
    fn from(wire: WireNode) -> Self {
        let kind = NodeKind::from_type_name(&wire.node_type);
        let image_paint = wire.fills.iter().find(|paint| paint.is_visible_image());
        let image_fill = kind == NodeKind::Image && wire.has_image_fill.unwrap_or(image_paint.is_some());
        let image_url = match image_fill {
            true => wire.image_url.or_else(|| image_paint.and_then(|paint| paint.image_ref.clone())),
            false => None,
        };
        Node {
            id: wire.id,
            name: wire.name,
            kind,
            text: wire.characters.filter(|_| kind == NodeKind::Text),
            image_fill,
            image_url,
            frame_name: wire.frame_name,
            children: wire.children.into_iter().map(Node::from).collect(),
        }
    }
}
