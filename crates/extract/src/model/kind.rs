use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Classification of a [`Node`](crate::Node).
///
/// The remote source knows many more node types than this; everything that
/// isn't text, an image candidate or a group is treated as a structural
/// container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    /// Frames, sections, components, instances and canvases.
    Container,
    /// A text leaf; carries the text payload.
    Text,
    /// A shape that may carry an image fill.
    Image,
    /// A plain grouping of other nodes.
    Group,
}
impl NodeKind {
    /// Map a remote type name (`"TEXT"`, `"RECTANGLE"`, `"FRAME"`...) onto a
    /// kind.
    pub fn from_type_name(type_name: &str) -> Self {
        match type_name.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Self::Text,
            "RECTANGLE" => Self::Image,
            "GROUP" => Self::Group,
            _ => Self::Container,
        }
    }

    /// The remote type name a node of this kind is reported as.
    pub fn as_type_name(&self) -> &'static str {
        match self {
            Self::Container => "FRAME",
            Self::Text => "TEXT",
            Self::Image => "RECTANGLE",
            Self::Group => "GROUP",
        }
    }
}
impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_type_name())
    }
}
