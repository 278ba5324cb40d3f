//! CSV input sources and parsing into an in-memory table.
//!
//! Every input form (string content, a byte stream, a file path) is reduced
//! to the same [`CsvTable`] before the header is resolved. Quoting is checked
//! up front so a malformed file fails with the exact line of the defect;
//! tokenizing itself is done by the `csv` crate.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use crate::error::{CsvError, CsvResult};

/// Default field delimiter.
pub const DEFAULT_DELIMITER: u8 = b',';

const BOM: char = '\u{feff}';

/// Where the CSV comes from. Exactly one source is used per run.
pub enum Source {
    /// In-memory CSV text.
    Content(String),
    /// A byte stream, decoded after reading.
    File(Box<dyn Read>),
    /// A path on disk, decoded after reading.
    Path(PathBuf),
}

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Content(_) => "content",
            Source::File(_) => "file",
            Source::Path(_) => "path",
        }
    }

    /// Read the source into text.
    ///
    /// Byte sources are decoded with `encoding` when given, otherwise the
    /// encoding is sniffed. Returns the text and the encoding used.
    pub fn read_to_string(self, encoding: Option<&str>) -> std::io::Result<(String, String)> {
        let bytes = match self {
            Source::Content(content) => return Ok((content, "utf-8".to_string())),
            Source::File(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                bytes
            }
            Source::Path(path) => std::fs::read(&path)?,
        };

        let encoding = match encoding {
            Some(label) => label.to_lowercase(),
            None => detect_encoding(&bytes),
        };
        let content = decode_content(&bytes, &encoding);
        Ok((content, encoding))
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Content(content) => f.debug_tuple("Content").field(&content.len()).finish(),
            Source::File(_) => f.write_str("File(..)"),
            Source::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// One data line of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// 1-based line the record starts on.
    pub line: usize,
    /// Raw cells, untrimmed.
    pub cells: Vec<String>,
}

impl CsvRecord {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

/// A fully parsed CSV input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    /// Header cells, trimmed.
    pub header: Vec<String>,
    /// Data records in file order.
    pub records: Vec<CsvRecord>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _confidence, _language) = chardet::detect(bytes);

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "iso-8859-15" | "latin-9" | "latin9" => "iso-8859-15".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to a string using an encoding label.
///
/// Latin-1 labels decode as windows-1252, which agrees with ISO-8859-1 on
/// every printable byte. Unknown labels and invalid UTF-8 fall back to lossy
/// UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding {
        "utf-8" | "utf8" | "utf-8-sig" | "ascii" => match String::from_utf8(bytes.to_vec()) {
            Ok(s) => s,
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => enc.decode(bytes).0.into_owned(),
            None => String::from_utf8_lossy(bytes).into_owned(),
        },
    }
}

/// Parse CSV text into a header and data records.
///
/// # Example
/// ```
/// use csv_importer::parser::parse_table;
///
/// let table = parse_table("email,name\nbob@example.com,Bob\n", b',').unwrap();
/// assert_eq!(table.header, vec!["email", "name"]);
/// assert_eq!(table.records[0].line, 2);
/// ```
pub fn parse_table(content: &str, delimiter: u8) -> CsvResult<CsvTable> {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    check_quoting(content, delimiter)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut table = CsvTable::default();
    let mut header_seen = false;

    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            CsvError::new(line, format!("Malformed CSV on line {}: {}", line, e))
        })?;

        if !header_seen {
            table.header = record
                .iter()
                .map(|cell| cell.trim().to_string())
                .collect();
            header_seen = true;
            continue;
        }

        if record.len() <= 1 && record.get(0).map_or(true, |c| c.trim().is_empty()) {
            continue;
        }

        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        table.records.push(CsvRecord {
            line,
            cells: record.iter().map(str::to_string).collect(),
        });
    }

    Ok(table)
}

/// Walk the input once and reject the first quoting defect.
///
/// Follows RFC 4180: a quoted field opens at the start of a field, `""`
/// escapes a quote inside it, and only a delimiter or line end may follow
/// the closing quote. `\n`, `\r\n` and a bare `\r` each end a line.
pub fn check_quoting(content: &str, delimiter: u8) -> CsvResult<()> {
    let delimiter = char::from(delimiter);
    let mut chars = content.chars().peekable();

    let mut line = 1;
    let mut field_start = true;
    let mut in_quotes = false;
    let mut after_quote = false;
    let mut opened_on = 0;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                }
                '"' => {
                    in_quotes = false;
                    after_quote = true;
                }
                '\n' => line += 1,
                '\r' if chars.peek() != Some(&'\n') => line += 1,
                _ => {}
            }
            continue;
        }

        match c {
            '\n' => {
                line += 1;
                field_start = true;
                after_quote = false;
            }
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    line += 1;
                }
                field_start = true;
                after_quote = false;
            }
            c if c == delimiter => {
                field_start = true;
                after_quote = false;
            }
            _ if after_quote => return Err(CsvError::value_after_quote(line)),
            '"' if field_start => {
                in_quotes = true;
                opened_on = line;
                field_start = false;
            }
            '"' => return Err(CsvError::illegal_quoting(line)),
            _ => field_start = false,
        }
    }

    if in_quotes {
        return Err(CsvError::unclosed_quote(opened_on));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let table = parse_table("name,age\nAlice,30\nBob,25", b',').unwrap();

        assert_eq!(table.header, vec!["name", "age"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].cells, vec!["Alice", "30"]);
        assert_eq!(table.records[1].line, 3);
    }

    #[test]
    fn test_semicolon_delimiter() {
        let table = parse_table("a;b;c\n1;2;3", b';').unwrap();
        assert_eq!(table.header, vec!["a", "b", "c"]);
        assert_eq!(table.records[0].cells, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_quoted_values() {
        let csv = "name,value\n\"Alice\",\"Hello, \"\"World\"\"\"\n";
        let table = parse_table(csv, b',').unwrap();

        assert_eq!(table.records[0].cells, vec!["Alice", "Hello, \"World\""]);
    }

    #[test]
    fn test_multiline_quoted_field_keeps_start_line() {
        let csv = "a,b\n\"line one\nline two\",x\n3,4\n";
        let table = parse_table(csv, b',').unwrap();

        assert_eq!(table.records[0].line, 2);
        assert_eq!(table.records[0].cells[0], "line one\nline two");
        assert_eq!(table.records[1].line, 4);
    }

    #[test]
    fn test_header_is_trimmed_and_bom_stripped() {
        let table = parse_table("\u{feff} Email , First name\nx,y", b',').unwrap();
        assert_eq!(table.header, vec!["Email", "First name"]);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let table = parse_table("a,b\n1,2\n\n3,4\n", b',').unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[1].line, 4);
    }

    #[test]
    fn test_empty_input() {
        let table = parse_table("", b',').unwrap();
        assert!(table.header.is_empty());
        assert!(table.records.is_empty());
    }

    #[test]
    fn test_unclosed_quote_names_line() {
        let csv = "email,name\nbob@example.com,Bob\n\"mark@example.com,Mark\n";
        let err = parse_table(csv, b',').unwrap_err();

        assert_eq!(err.line, 3);
        assert_eq!(err.message, "Unclosed quoted field on line 3.");
    }

    #[test]
    fn test_illegal_quoting() {
        let err = check_quoting("a,b\nab\"c,d\n", b',').unwrap_err();
        assert_eq!(err.to_string(), "Illegal quoting on line 2.");
    }

    #[test]
    fn test_value_after_quoted_field() {
        let err = check_quoting("a,b\n\"ab\"c,d\n", b',').unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.starts_with("Any value after quoted field"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let table = parse_table("a,b\r\n\"1\",2\r\n3,4\r\n", b',').unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].cells, vec!["1", "2"]);
    }

    #[test]
    fn test_source_path_is_decoded() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"name\nSoci\xe9t\xe9\n").unwrap();

        let source = Source::Path(file.path().to_path_buf());
        let (content, encoding) = source.read_to_string(Some("iso-8859-1")).unwrap();

        assert_eq!(encoding, "iso-8859-1");
        assert!(content.contains("Société"));
    }

    #[test]
    fn test_source_stream() {
        let source = Source::File(Box::new(std::io::Cursor::new(b"a,b\n1,2\n".to_vec())));
        let (content, encoding) = source.read_to_string(None).unwrap();

        assert_eq!(content, "a,b\n1,2\n");
        assert_eq!(encoding, "utf-8");
    }

    #[test]
    fn test_latin1_decoding() {
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_latin1_keeps_currency_and_fractions() {
        assert_eq!(decode_content(&[0xA4], "iso-8859-1"), "¤");
        assert_eq!(decode_content(&[0xA6, 0xA8, 0xB4, 0xB8], "latin1"), "¦¨´¸");
        assert_eq!(decode_content(&[0xBC, 0xBD, 0xBE], "latin-1"), "¼½¾");
        assert_eq!(decode_content(&[0xA4], "iso-8859-15"), "€");
    }

    #[test]
    fn test_bom_before_quoted_header() {
        let table = parse_table("\u{feff}\"email\",name\nbob@example.com,Bob\n", b',').unwrap();

        assert_eq!(table.header, vec!["email", "name"]);
        assert_eq!(table.records[0].line, 2);
        assert_eq!(table.records[0].cells, vec!["bob@example.com", "Bob"]);
    }

    #[test]
    fn test_utf8_sig_label() {
        let bytes = b"\xef\xbb\xbf\"a\",b\n1,2\n".to_vec();
        let source = Source::File(Box::new(std::io::Cursor::new(bytes)));
        let (content, encoding) = source.read_to_string(Some("UTF-8-SIG")).unwrap();

        assert_eq!(encoding, "utf-8-sig");
        assert_eq!(parse_table(&content, b',').unwrap().header, vec!["a", "b"]);
    }

    #[test]
    fn test_bare_cr_line_endings() {
        let err = check_quoting("a,b\r1,2\rab\"c,d\r", b',').unwrap_err();
        assert_eq!(err.to_string(), "Illegal quoting on line 3.");

        let err = check_quoting("a,b\r\"x\ry\",1\r\"open,2\r", b',').unwrap_err();
        assert_eq!(err.to_string(), "Unclosed quoted field on line 4.");

        let err = check_quoting("a,b\r\n1,2\r\nab\"c,d\r\n", b',').unwrap_err();
        assert_eq!(err.line, 3);
    }
}
