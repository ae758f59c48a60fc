//! Pluggable tabular indexes of the extracted records.

mod csv;
mod jsonl;
mod rows;

pub use self::csv::CsvFormatter;
pub use self::jsonl::JsonLinesFormatter;
pub use self::rows::{IndexRow, grouped_rows};
use crate::error::{ErrorKind, Result};
use figpack_extract::ExportData;
use std::collections::HashMap;
use std::sync::Arc;

/// Renders [`ExportData`] as one index file.
pub trait IndexFormatter: Send + Sync {
    /// Name the format is selected by, e.g. `"csv"`.
    fn format_name(&self) -> &str;

    /// Entry name of the generated file inside the archive.
    fn file_name(&self) -> &str;

    fn generate(&self, data: &ExportData) -> Result<Vec<u8>>;
}

fn normalize(format: &str) -> String {
    format.trim().to_ascii_lowercase()
}

/// Formatters by (case-insensitive) format name, built once and shared.
#[derive(Clone)]
pub struct FormatterRegistry {
    formatters: HashMap<String, Arc<dyn IndexFormatter>>,
}

impl FormatterRegistry {
    /// A registry without any formatters.
    pub fn empty() -> Self {
        Self { formatters: HashMap::new() }
    }

    /// Add `formatter`, replacing any registered under the same name.
    pub fn register(&mut self, formatter: Arc<dyn IndexFormatter>) {
        self.formatters.insert(normalize(formatter.format_name()), formatter);
    }

    pub fn with(mut self, formatter: impl IndexFormatter + 'static) -> Self {
        self.register(Arc::new(formatter));
        self
    }

    pub fn is_format_supported(&self, format: &str) -> bool {
        self.formatters.contains_key(&normalize(format))
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.formatters.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    pub fn generate(&self, format: &str, data: &ExportData) -> Result<Vec<u8>> {
        let formatter = self.formatters.get(&normalize(format));
        let Some(formatter) = formatter else {
            exn::bail!(ErrorKind::UnsupportedFormat(format.to_string()));
        };
        formatter.generate(data)
    }

    /// Entry name for `format`, falling back to `index.<format>` for formats
    /// that aren't registered.
    pub fn file_name(&self, format: &str) -> String {
        let format = normalize(format);
        match self.formatters.get(&format) {
            Some(formatter) => formatter.file_name().to_string(),
            None => format!("index.{format}"),
        }
    }
}

impl Default for FormatterRegistry {
    /// CSV and JSON Lines.
    fn default() -> Self {
        Self::empty().with(CsvFormatter).with(JsonLinesFormatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("csv", true, "index.csv")]
    #[case(" CSV ", true, "index.csv")]
    #[case("jsonl", true, "index.jsonl")]
    #[case("xlsx", false, "index.xlsx")]
    fn test_registry_lookup(#[case] format: &str, #[case] supported: bool, #[case] file_name: &str) {
        let registry = FormatterRegistry::default();
        assert_eq!(registry.is_format_supported(format), supported);
        assert_eq!(registry.file_name(format), file_name);
    }

    #[test]
    fn test_unsupported_format_fails_generation() {
        let err = FormatterRegistry::default().generate("xlsx", &ExportData::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(format) if format == "xlsx"));
    }

    #[test]
    fn test_empty_registry_supports_nothing() {
        let registry = FormatterRegistry::empty();
        assert!(registry.formats().is_empty());
        assert!(!registry.is_format_supported("csv"));
        assert_eq!(FormatterRegistry::default().formats(), ["csv", "jsonl"]);
    }
}
