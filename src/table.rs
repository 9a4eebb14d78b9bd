use std::fs::File;
use std::io::{Read, Write};

use camino::Utf8Path;
use csv::{ByteRecord, QuoteStyle, ReaderBuilder, Trim, WriterBuilder};

use crate::error::SampleError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: usize,
    pub fields: Vec<String>,
}

impl Row {
    pub fn get(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

pub fn open(path: &Utf8Path) -> Result<File, SampleError> {
    if !path.as_std_path().is_file() {
        return Err(SampleError::MissingInput(path.to_path_buf()));
    }
    File::open(path.as_std_path())
        .map_err(|err| SampleError::Filesystem(format!("open {path}: {err}")))
}

/// Read every non-blank line. Quotes are literal, fields are trimmed, rows may be ragged and
/// invalid UTF-8 is replaced rather than rejected.
pub fn read_rows<R: Read>(source: R) -> Result<Vec<Row>, SampleError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(Trim::All)
        .from_reader(source);

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let line = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(rows.len() + 1);
        let fields = record
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect();
        rows.push(Row { line, fields });
    }
    Ok(rows)
}

pub fn read_rows_from_path(path: &Utf8Path) -> Result<Vec<Row>, SampleError> {
    read_rows(open(path)?)
}

pub fn writer<W: Write>(sink: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .flexible(true)
        .from_writer(sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_keep_quotes_and_raggedness() {
        let input = "a\tb\tc\n\"x\" \t y\n\n1\t2\t3\n";
        let rows = read_rows(input.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].fields, vec!["\"x\"", "y"]);
        assert_eq!(rows[2].get(2), Some("3"));
        assert_eq!(rows[0].line, 1);
    }

    #[test]
    fn writer_does_not_quote() {
        let mut out = writer(Vec::new());
        out.write_record(["a b", "\"c\"", "N/A"]).unwrap();
        let bytes = out.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "a b\t\"c\"\tN/A\n");
    }
}
