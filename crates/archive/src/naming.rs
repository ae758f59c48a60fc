use figpack_extract::ImageRecord;
use std::collections::{HashMap, HashSet};

const FORBIDDEN: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
const PAGE_FALLBACK: &str = "UnknownPage";
const NAME_FALLBACK: &str = "image";
const EXTENSION: &str = "png";

/// Replace every character that can't appear in an archive path segment
/// (`\ / : * ? " < > |`) with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars().map(|c| if FORBIDDEN.contains(&c) { '_' } else { c }).collect()
}

fn sanitize_or(name: Option<&str>, fallback: &str) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => sanitize(name),
        _ => fallback.to_string(),
    }
}

/// Folder for an image: its page, then its frame when it has one.
fn folder(image: &ImageRecord) -> String {
    let page = sanitize_or(Some(&image.page_name), PAGE_FALLBACK);
    match image.frame_name.as_deref() {
        Some(frame) if !frame.trim().is_empty() => format!("{page}/{}", sanitize(frame)),
        _ => page,
    }
}

fn base_name(image: &ImageRecord) -> String {
    format!("{}_id_{}", sanitize_or(Some(&image.node_name), NAME_FALLBACK), sanitize(&image.node_id))
}

/// Hands out unique archive paths for images.
///
/// The first image to claim a `folder/base` gets it bare; later ones get
/// `_2`, `_3`... before the extension, skipping any path already handed out.
/// Paths depend on the order images are named in, so name them in document
/// order for stable output.
#[derive(Debug, Default)]
pub struct EntryNamer {
    seen: HashMap<String, u32>,
    issued: HashSet<String>,
}
impl EntryNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_for(&mut self, image: &ImageRecord) -> String {
        let stem = format!("{}/{}", folder(image), base_name(image));
        let count = self.seen.entry(stem.clone()).or_insert(0);
        loop {
            *count += 1;
            let candidate = match *count {
                1 => format!("{stem}.{EXTENSION}"),
                n => format!("{stem}_{n}.{EXTENSION}"),
            };
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
