//! Design document model and the tree walk that flattens it.
//!
//! A [`Document`] is an ordered list of [`Page`]s, each holding a tree of
//! [`Node`]s. Extraction walks every page depth-first and projects the nodes
//! that carry content (text leaves and image-filled leaves) into flat
//! [`TextRecord`] and [`ImageRecord`] sequences, bundled as [`ExportData`].
//!
//! Extraction is pure: no I/O, no shared state, and the output preserves the
//! order in which nodes appear in the document.

mod model;
mod walk;

pub use crate::model::{Document, ExportData, ImageRecord, Node, NodeKind, Page, TextRecord};
pub use crate::walk::{
    Extracted, Extractor, PATH_SEPARATOR, SELECTED_PAGE_NAME, SELECTED_VERSION, extract_document, extract_selected,
};
