use crate::model::{Document, ExportData, ImageRecord, Node, NodeKind, TextRecord};
use tracing::instrument;

/// Joins ancestor names in a record's path.
pub const PATH_SEPARATOR: &str = " → ";
/// Page name given to records extracted from an explicit node selection.
pub const SELECTED_PAGE_NAME: &str = "Selected";
/// Version tag given to exports of an explicit node selection.
pub const SELECTED_VERSION: &str = "v1";

/// The two record sequences produced by a walk, in document order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub texts: Vec<TextRecord>,
    pub images: Vec<ImageRecord>,
}
impl Extracted {
    fn append(&mut self, mut other: Extracted) {
        self.texts.append(&mut other.texts);
        self.images.append(&mut other.images);
    }
}

/// Walks the node trees of a single page.
///
/// Each call to [`walk`](Self::walk) builds fresh output; the extractor itself
/// holds nothing but the page name stamped onto every record.
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'a> {
    page_name: &'a str,
}
impl<'a> Extractor<'a> {
    pub fn new(page_name: &'a str) -> Self {
        Self { page_name }
    }

    /// Depth-first walk over `nodes`, which are treated as top-level (their
    /// path is their own name).
    pub fn walk(&self, nodes: &[Node]) -> Extracted {
        let mut extracted = Extracted::default();
        for node in nodes {
            extracted.append(self.visit(node, "", None));
        }
        extracted
    }

    fn visit(&self, node: &Node, parent_path: &str, container: Option<&str>) -> Extracted {
        let path = match parent_path {
            "" => node.name.clone(),
            _ => format!("{parent_path}{PATH_SEPARATOR}{}", node.name),
        };
        let frame_name = node.frame_name.as_deref().or(container).map(str::to_string);

        let mut extracted = Extracted::default();
        match (node.kind, node.text.as_ref()) {
            (NodeKind::Text, Some(text)) => extracted.texts.push(TextRecord {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                page_name: self.page_name.to_string(),
                frame_name,
                path: path.clone(),
                text: text.clone(),
            }),
            (NodeKind::Image, _) if node.image_fill => extracted.images.push(ImageRecord {
                node_id: node.id.clone(),
                node_name: node.name.clone(),
                page_name: self.page_name.to_string(),
                frame_name,
                path: path.clone(),
                image_url: node.image_url.clone(),
                archive_path: None,
            }),
            _ => {},
        }

        // Classified nodes still descend; a frame-like ancestor names the
        // records found beneath it.
        let container = match node.kind {
            NodeKind::Container => Some(node.name.as_str()),
            _ => container,
        };
        for child in &node.children {
            extracted.append(self.visit(child, &path, container));
        }
        extracted
    }
}

/// Extract every text and image record from a full document.
#[instrument(skip(document), fields(version = %document.version, pages = document.pages.len()))]
pub fn extract_document(document: &Document) -> ExportData {
    let mut extracted = Extracted::default();
    for page in &document.pages {
        extracted.append(Extractor::new(&page.name).walk(&page.children));
    }
    tracing::debug!(texts = extracted.texts.len(), images = extracted.images.len(), "Extracted document content");
    ExportData { version: document.version.clone(), texts: extracted.texts, images: extracted.images }
}

/// Extract records from an explicit selection of nodes, which don't belong
/// to a known page.
pub fn extract_selected(nodes: &[Node]) -> ExportData {
    let extracted = Extractor::new(SELECTED_PAGE_NAME).walk(nodes);
    ExportData { version: SELECTED_VERSION.to_string(), texts: extracted.texts, images: extracted.images }
}
