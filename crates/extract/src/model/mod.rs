mod document;
mod kind;
mod records;

pub use self::document::{Document, Node, Page};
pub use self::kind::NodeKind;
pub use self::records::{ExportData, ImageRecord, TextRecord};
