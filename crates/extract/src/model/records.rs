use serde::{Deserialize, Serialize};

/// A text leaf flattened out of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRecord {
    pub node_id: String,
    pub node_name: String,
    pub page_name: String,
    pub frame_name: Option<String>,
    /// Ancestor names joined with [`PATH_SEPARATOR`](crate::PATH_SEPARATOR).
    pub path: String,
    pub text: String,
}

/// An image-filled leaf flattened out of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub node_id: String,
    pub node_name: String,
    pub page_name: String,
    pub frame_name: Option<String>,
    pub path: String,
    pub image_url: Option<String>,
    /// Where the asset is placed inside the archive, once planned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
}

/// Everything extracted from one document: the payload handed to index
/// formatters and written out as archive metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportData {
    pub version: String,
    pub texts: Vec<TextRecord>,
    pub images: Vec<ImageRecord>,
}
impl ExportData {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.images.is_empty()
    }
}
