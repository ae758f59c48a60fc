use figpack_extract::{ExportData, NodeKind};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Page name for records that don't belong to one.
const NO_PAGE: &str = "(no page)";

/// One line of an index: a text or image record with the columns of the
/// other kind left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRow<'a> {
    pub node_id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub page_name: &'a str,
    pub frame_name: Option<&'a str>,
    pub node_name: &'a str,
    pub text: &'a str,
    pub image_url: &'a str,
    pub path: &'a str,
    pub archive_path: &'a str,
}

fn by_frame_then_name(a: &IndexRow<'_>, b: &IndexRow<'_>) -> Ordering {
    let frames = match (a.frame_name, b.frame_name) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    frames.then_with(|| a.node_name.cmp(b.node_name))
}

/// All records grouped by page name (pages in sorted order), each group
/// sorted by frame name (records without one last) then node name.
pub fn grouped_rows(data: &ExportData) -> BTreeMap<&str, Vec<IndexRow<'_>>> {
    let texts = data.texts.iter().map(|text| IndexRow {
        node_id: &text.node_id,
        kind: NodeKind::Text.as_type_name(),
        page_name: &text.page_name,
        frame_name: text.frame_name.as_deref(),
        node_name: &text.node_name,
        text: &text.text,
        image_url: "",
        path: &text.path,
        archive_path: "",
    });
    let images = data.images.iter().map(|image| IndexRow {
        node_id: &image.node_id,
        kind: NodeKind::Image.as_type_name(),
        page_name: &image.page_name,
        frame_name: image.frame_name.as_deref(),
        node_name: &image.node_name,
        text: "",
        image_url: image.image_url.as_deref().unwrap_or_default(),
        path: &image.path,
        archive_path: image.archive_path.as_deref().unwrap_or_default(),
    });

    let mut pages: BTreeMap<&str, Vec<IndexRow<'_>>> = BTreeMap::new();
    for row in texts.chain(images) {
        let page = match row.page_name.trim() {
            "" => NO_PAGE,
            _ => row.page_name,
        };
        pages.entry(page).or_default().push(row);
    }
    for rows in pages.values_mut() {
        rows.sort_by(by_frame_then_name);
    }
    pages
}
