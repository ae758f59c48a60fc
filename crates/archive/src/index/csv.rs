use super::IndexFormatter;
use super::rows::grouped_rows;
use crate::error::Result;
use figpack_extract::ExportData;

const BOM: &str = "\u{feff}";
const SEPARATOR: &str = ";";
const HEADER: [&str; 9] =
    ["nodeId", "type", "pageName", "frameName", "nodeName", "text", "imageUrl", "path", "archivePath"];

/// Semicolon-separated index that opens cleanly in spreadsheet software:
/// UTF-8 with a byte-order mark, one block of rows per page separated by an
/// empty line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFormatter;

fn escape(value: &str) -> String {
    if value.contains([';', '"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn push_line<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let line: Vec<String> = fields.into_iter().map(escape).collect();
    out.push_str(&line.join(SEPARATOR));
    out.push('\n');
}

impl IndexFormatter for CsvFormatter {
    fn format_name(&self) -> &str {
        "csv"
    }

    fn file_name(&self) -> &str {
        "index.csv"
    }

    fn generate(&self, data: &ExportData) -> Result<Vec<u8>> {
        let mut out = String::from(BOM);
        push_line(&mut out, HEADER);
        for rows in grouped_rows(data).values() {
            for row in rows {
                push_line(
                    &mut out,
                    [
                        row.node_id,
                        row.kind,
                        row.page_name,
                        row.frame_name.unwrap_or_default(),
                        row.node_name,
                        row.text,
                        row.image_url,
                        row.path,
                        row.archive_path,
                    ],
                );
            }
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figpack_extract::TextRecord;
    use rstest::rstest;

    #[rstest]
    #[case("plain", "plain")]
    #[case("a;b", "\"a;b\"")]
    #[case("say \"hi\"", "\"say \"\"hi\"\"\"")]
    #[case("one, two", "\"one, two\"")]
    #[case("line\nbreak", "\"line\nbreak\"")]
    #[case("", "")]
    fn test_escape(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape(input), expected);
    }

    #[test]
    fn test_generate_layout() {
        let record = |page: &str, name: &str, text: &str| TextRecord {
            node_id: name.to_string(),
            node_name: name.to_string(),
            page_name: page.to_string(),
            frame_name: Some("Frame".to_string()),
            path: format!("Frame → {name}"),
            text: text.to_string(),
        };
        let data = ExportData {
            version: "1".to_string(),
            texts: vec![record("B", "2", "x;y"), record("A", "1", "hello")],
            images: vec![],
        };
        let csv = String::from_utf8(CsvFormatter.generate(&data).unwrap()).unwrap();
        let expected = concat!(
            "\u{feff}nodeId;type;pageName;frameName;nodeName;text;imageUrl;path;archivePath\n",
            "1;TEXT;A;Frame;1;hello;;Frame → 1;\n",
            "\n",
            "2;TEXT;B;Frame;2;\"x;y\";;Frame → 2;\n",
            "\n",
        );
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_generate_without_records_has_header_only() {
        let csv = CsvFormatter.generate(&ExportData::default()).unwrap();
        assert!(csv.starts_with(BOM.as_bytes()));
        assert_eq!(csv.iter().filter(|&&b| b == b'\n').count(), 1);
    }
}
