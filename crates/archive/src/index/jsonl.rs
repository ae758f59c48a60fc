use super::IndexFormatter;
use super::rows::grouped_rows;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figpack_extract::ExportData;

/// One JSON object per record, in the same order as the CSV index.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesFormatter;

impl IndexFormatter for JsonLinesFormatter {
    fn format_name(&self) -> &str {
        "jsonl"
    }

    fn file_name(&self) -> &str {
        "index.jsonl"
    }

    fn generate(&self, data: &ExportData) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for row in grouped_rows(data).values().flatten() {
            serde_json::to_writer(&mut out, row).or_raise(|| ErrorKind::Index(self.format_name().to_string()))?;
            out.push(b'\n');
        }
        Ok(out)
    }
}
