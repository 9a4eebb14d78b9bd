use std::collections::BTreeMap;
use std::io::Write;

use camino::Utf8Path;
use serde::Serialize;
use tracing::warn;

use crate::demix::{DemixRecord, SUMMARY_HEADER};
use crate::diagnostics::{Notice, NoticeKind};
use crate::domain::{IdMode, SampleId, sanitize};
use crate::error::SampleError;
use crate::mapping::MetadataTable;
use crate::table::{self, Row};

pub const MISSING_JOIN: &str = "N/A";
pub const MISSING_COVERAGE: &str = "not found";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedTable {
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
    pub notices: Vec<Notice>,
}

impl MergedTable {
    pub fn write_to<W: Write>(&self, sink: W) -> Result<(), SampleError> {
        let mut writer = table::writer(sink);
        if let Some(header) = &self.header {
            writer.write_record(header)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .flush()
            .map_err(|err| SampleError::Filesystem(err.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SampleError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }
}

/// Column numbers are 1-based, as typed on the command line.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub key_a: usize,
    pub key_b: Option<usize>,
    pub columns: Vec<usize>,
    pub has_header: bool,
}

fn zero_based(column: usize) -> Result<usize, SampleError> {
    column
        .checked_sub(1)
        .ok_or_else(|| SampleError::InvalidColumn(column.to_string()))
}

pub fn merge_rows(a: &[Row], b: &[Row], options: &MergeOptions) -> Result<MergedTable, SampleError> {
    let key_a = zero_based(options.key_a)?;
    let key_b = zero_based(options.key_b.unwrap_or(options.key_a))?;
    let columns = options
        .columns
        .iter()
        .map(|&column| zero_based(column))
        .collect::<Result<Vec<_>, _>>()?;

    let (a_header, a_rows) = split_header(a, options.has_header);
    let (b_header, b_rows) = split_header(b, options.has_header);

    let mut merged = MergedTable::default();
    if options.has_header {
        let a_header = a_header.map(|row| row.fields.as_slice()).unwrap_or_default();
        let b_header = b_header.map(|row| row.fields.as_slice()).unwrap_or_default();
        for &column in columns.iter().chain([&key_a]) {
            if column >= a_header.len() {
                return Err(SampleError::ColumnOutOfRange {
                    column: column + 1,
                    width: a_header.len(),
                });
            }
        }
        if key_b >= b_header.len() {
            return Err(SampleError::ColumnOutOfRange {
                column: key_b + 1,
                width: b_header.len(),
            });
        }
        let mut header: Vec<String> = b_header.iter().map(|h| sanitize(h)).collect();
        header.extend(columns.iter().map(|&idx| sanitize(&a_header[idx])));
        merged.header = Some(header);
    }

    let mut key_to_values: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for row in a_rows {
        let values: Option<Vec<String>> = columns
            .iter()
            .map(|&idx| row.get(idx).map(str::to_string))
            .collect();
        let (Some(key), Some(values)) = (row.get(key_a), values) else {
            merged
                .notices
                .push(Notice::new(NoticeKind::MalformedRow { line: row.line }));
            continue;
        };
        key_to_values.insert(key, values);
    }

    for row in b_rows {
        let Some(key) = row.get(key_b) else {
            merged
                .notices
                .push(Notice::new(NoticeKind::MalformedRow { line: row.line }));
            continue;
        };
        let mut fields = row.fields.clone();
        match key_to_values.get(key) {
            Some(values) => fields.extend(values.iter().cloned()),
            None => {
                warn!("key {key} not in mapping");
                merged
                    .notices
                    .push(Notice::new(NoticeKind::MissingKey).sample(key));
                fields.extend(columns.iter().map(|_| MISSING_JOIN.to_string()));
            }
        }
        merged.rows.push(fields);
    }
    Ok(merged)
}

fn split_header(rows: &[Row], has_header: bool) -> (Option<&Row>, &[Row]) {
    match rows.split_first() {
        Some((first, rest)) if has_header => (Some(first), rest),
        _ => (None, rows),
    }
}

pub fn merge_files(
    a: &Utf8Path,
    b: &Utf8Path,
    options: &MergeOptions,
) -> Result<MergedTable, SampleError> {
    let a_rows = table::read_rows_from_path(a)?;
    let b_rows = table::read_rows_from_path(b)?;
    merge_rows(&a_rows, &b_rows, options)
}

/// Coverage file lines are `<file name>\t<coverage>`; the key is the sample id of the name.
pub fn read_coverage(
    path: &Utf8Path,
    mode: IdMode,
) -> Result<(BTreeMap<SampleId, String>, Vec<Notice>), SampleError> {
    let mut coverage = BTreeMap::new();
    let mut notices = Vec::new();
    let extractor = mode.extractor("");
    for row in table::read_rows_from_path(path)? {
        let (Some(name), Some(value)) = (row.get(0), row.get(1)) else {
            notices.push(Notice::new(NoticeKind::MalformedRow { line: row.line }).path(path));
            continue;
        };
        match extractor.extract(name) {
            Some(found) => {
                coverage.insert(found.id, value.to_string());
            }
            None => notices.push(
                Notice::new(NoticeKind::NoSampleId)
                    .sample(name)
                    .path(path),
            ),
        }
    }
    Ok((coverage, notices))
}

pub fn enrich(
    metadata: &MetadataTable,
    coverage: Option<&BTreeMap<SampleId, String>>,
    summaries: Option<&BTreeMap<SampleId, DemixRecord>>,
) -> MergedTable {
    let mut header = metadata.header().to_vec();
    if coverage.is_some() {
        header.push("coverage".to_string());
    }
    if summaries.is_some() {
        header.extend(SUMMARY_HEADER.iter().map(|name| name.to_string()));
    }

    let mut merged = MergedTable {
        header: Some(header),
        ..MergedTable::default()
    };
    for row in metadata.rows() {
        let Some(id) = metadata.id_of(row) else {
            continue;
        };
        let mut fields = row.fields.clone();
        if let Some(coverage) = coverage {
            match coverage.get(&id) {
                Some(value) => fields.push(value.clone()),
                None => {
                    merged
                        .notices
                        .push(Notice::new(NoticeKind::MissingCoverage).sample(&id));
                    fields.push(MISSING_COVERAGE.to_string());
                }
            }
        }
        if let Some(summaries) = summaries {
            match summaries.get(&id) {
                Some(record) => fields.extend(record.summary_fields()),
                None => {
                    merged
                        .notices
                        .push(Notice::new(NoticeKind::MissingSummary).sample(&id));
                    fields.extend(SUMMARY_HEADER.iter().map(|_| MISSING_JOIN.to_string()));
                }
            }
        }
        merged.rows.push(fields);
    }
    merged
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn rows(text: &str) -> Vec<Row> {
        table::read_rows(text.as_bytes()).unwrap()
    }

    #[test]
    fn merge_appends_selected_columns() {
        let a = rows("id\tsite\tplant\nS1\tA\tPlant A\nS2\tB\tPlant B\n");
        let b = rows("sample\treads\nS2\t100\nS9\t5\n");
        let options = MergeOptions {
            key_a: 1,
            key_b: Some(1),
            columns: vec![3, 2],
            has_header: true,
        };
        let merged = merge_rows(&a, &b, &options).unwrap();
        assert_eq!(
            merged.header.as_deref(),
            Some(&["sample", "reads", "plant", "site"].map(String::from)[..])
        );
        assert_eq!(merged.rows[0], vec!["S2", "100", "Plant B", "B"]);
        assert_eq!(merged.rows[1], vec!["S9", "5", "N/A", "N/A"]);
        assert_matches!(merged.notices[0].kind, NoticeKind::MissingKey);
    }

    #[test]
    fn merge_rejects_zero_and_wide_columns() {
        let a = rows("id\tsite\nS1\tA\n");
        let b = rows("id\nS1\n");
        let zero = MergeOptions {
            key_a: 0,
            key_b: None,
            columns: vec![],
            has_header: false,
        };
        assert_matches!(merge_rows(&a, &b, &zero), Err(SampleError::InvalidColumn(_)));

        let wide = MergeOptions {
            key_a: 1,
            key_b: None,
            columns: vec![7],
            has_header: true,
        };
        assert_matches!(
            merge_rows(&a, &b, &wide),
            Err(SampleError::ColumnOutOfRange { column: 7, width: 2 })
        );
    }

    #[test]
    fn short_rows_of_a_are_reported_without_header() {
        let a = rows("S1\tA\tPlant A\nS2\tB\n");
        let b = rows("S1\t10\nS2\t20\n");
        let options = MergeOptions {
            key_a: 1,
            key_b: None,
            columns: vec![3],
            has_header: false,
        };
        let merged = merge_rows(&a, &b, &options).unwrap();
        assert_eq!(merged.rows[0], vec!["S1", "10", "Plant A"]);
        assert_eq!(merged.rows[1], vec!["S2", "20", MISSING_JOIN]);
        assert_matches!(merged.notices[0].kind, NoticeKind::MalformedRow { line: 2 });
        assert_matches!(merged.notices[1].kind, NoticeKind::MissingKey);
    }

    #[test]
    fn merged_table_writes_tsv() {
        let table = MergedTable {
            header: Some(vec!["a".to_string(), "b".to_string()]),
            rows: vec![vec!["1".to_string(), "N/A".to_string()]],
            notices: Vec::new(),
        };
        let text = String::from_utf8(table.to_bytes().unwrap()).unwrap();
        assert_eq!(text, "a\tb\n1\tN/A\n");
    }
}
