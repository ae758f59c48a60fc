use super::NodeKind;
use serde::{Deserialize, Serialize};

/// A fully assembled design document.
///
/// Immutable once assembled; shared read-only between everyone waiting on the
/// same fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: String,
    pub pages: Vec<Page>,
}
impl Document {
    pub fn new(version: impl Into<String>, pages: Vec<Page>) -> Self {
        Self { version: version.into(), pages }
    }

    /// Page identifiers, in document order.
    pub fn page_ids(&self) -> Vec<&str> {
        self.pages.iter().map(|page| page.id.as_str()).collect()
    }
}

/// A top-level canvas. Identifiers are unique within a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}
impl Page {
    pub fn new(id: impl Into<String>, name: impl Into<String>, children: Vec<Node>) -> Self {
        Self { id: id.into(), name: name.into(), children }
    }
}

/// One element of a page's tree.
///
/// `text` is only meaningful for [`NodeKind::Text`]; `image_fill` and
/// `image_url` only for [`NodeKind::Image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub image_fill: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Name of the enclosing frame, when the source reports it explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}
impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            text: None,
            image_fill: false,
            image_url: None,
            frame_name: None,
            children: Vec::new(),
        }
    }

    pub fn container(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Container)
    }

    pub fn group(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeKind::Group)
    }

    pub fn text(id: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::new(id, name, NodeKind::Text) }
    }

    /// An image leaf with its fill flag set.
    pub fn image(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { image_fill: true, image_url: Some(url.into()), ..Self::new(id, name, NodeKind::Image) }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn with_frame_name(mut self, frame_name: impl Into<String>) -> Self {
        self.frame_name = Some(frame_name.into());
        self
    }

    /// Copy of this node with everything deeper than `depth` levels below it
    /// removed. A depth of zero keeps the node itself only.
    pub fn truncated(&self, depth: u32) -> Self {
        let children = match depth {
            0 => Vec::new(),
            _ => self.children.iter().map(|child| child.truncated(depth - 1)).collect(),
        };
        Self { children, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deep_tree() -> Node {
        Node::container("1", "root").with_children(vec![
            Node::group("2", "group").with_children(vec![Node::text("3", "label", "hello")]),
        ])
    }

    #[test]
    fn test_truncated_zero_keeps_only_node() {
        let node = deep_tree().truncated(0);
        assert_eq!(node.id, "1");
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_truncated_keeps_requested_levels() {
        let node = deep_tree().truncated(1);
        assert_eq!(node.children.len(), 1);
        assert!(node.children[0].children.is_empty());
        assert_eq!(deep_tree().truncated(5), deep_tree());
    }

    #[test]
    fn test_node_deserializes_with_defaults() {
        let node: Node = serde_json::from_str(r#"{"id":"1:2","name":"Logo","kind":"IMAGE","imageFill":true}"#).unwrap();
        assert_eq!(node.kind, NodeKind::Image);
        assert!(node.image_fill);
        assert!(node.image_url.is_none());
        assert!(node.children.is_empty());
    }
}
