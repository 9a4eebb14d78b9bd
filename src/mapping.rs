use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, warn};

use crate::diagnostics::{Notice, NoticeKind, ResolveError};
use crate::domain::{CollectionDate, IdMode, Label, SampleId, sanitize};
use crate::error::SampleError;
use crate::table::{self, Row};

const ID_HEADERS: [&str; 2] = ["sample_id", "sample id"];
const DATE_HEADERS: [&str; 2] = ["sample_collect_date", "date"];
const SITE_HEADERS: [&str; 2] = ["site_id", "siteid"];
const LABEL_HEADERS: [&str; 3] = ["wwtp_name", "site_id", "siteid"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub header: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub id: SampleId,
    pub date: Option<String>,
    pub site: Option<String>,
    pub columns: Vec<Column>,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataTable {
    origin: Utf8PathBuf,
    header: Vec<String>,
    id_column: usize,
    date_column: Option<usize>,
    site_column: Option<usize>,
    label_columns: Vec<usize>,
    rows: Vec<Row>,
    notices: Vec<Notice>,
}

impl MetadataTable {
    pub fn load(path: &Utf8Path) -> Result<Self, SampleError> {
        Self::from_reader(table::open(path)?, path)
    }

    pub fn from_reader<R: Read>(source: R, origin: &Utf8Path) -> Result<Self, SampleError> {
        let mut rows = table::read_rows(source)?.into_iter();
        let header_row = rows
            .next()
            .ok_or_else(|| SampleError::EmptyTable(origin.to_path_buf()))?;

        let mut id_column = None;
        let mut date_column = None;
        let mut site_column = None;
        let mut label_columns = Vec::new();
        for (idx, token) in header_row.fields.iter().enumerate() {
            let name = token.to_lowercase();
            if ID_HEADERS.contains(&name.as_str()) && id_column.is_none() {
                id_column = Some(idx);
            }
            if DATE_HEADERS.contains(&name.as_str()) && date_column.is_none() {
                date_column = Some(idx);
            }
            if SITE_HEADERS.contains(&name.as_str()) {
                debug!(column = idx, "found siteid column");
                site_column = Some(idx);
            }
            if LABEL_HEADERS.contains(&name.as_str()) {
                label_columns.push(idx);
            }
        }
        let id_column = id_column.unwrap_or(0);
        debug!(
            origin = %origin,
            id_column,
            ?date_column,
            ?site_column,
            "metadata header"
        );

        let header: Vec<String> = header_row.fields.iter().map(|h| sanitize(h)).collect();
        let mut notices = Vec::new();
        let mut accepted = Vec::new();
        for row in rows {
            let id_present = row.get(id_column).is_some_and(|id| !id.is_empty());
            if row.fields.len() < header.len() || !id_present {
                notices.push(
                    Notice::new(NoticeKind::MalformedRow { line: row.line }).path(origin),
                );
                continue;
            }
            accepted.push(row);
        }

        Ok(Self {
            origin: origin.to_path_buf(),
            header,
            id_column,
            date_column,
            site_column,
            label_columns,
            rows: accepted,
            notices,
        })
    }

    pub fn origin(&self) -> &Utf8Path {
        &self.origin
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn id_column(&self) -> usize {
        self.id_column
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn id_of(&self, row: &Row) -> Option<SampleId> {
        row.get(self.id_column).map(SampleId::new)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }
}

#[derive(Debug, Default)]
pub struct MappingBuilder {
    samples: BTreeMap<SampleId, SampleRecord>,
    sites: BTreeMap<String, Vec<Label>>,
    table: Option<MetadataTable>,
    notices: Vec<Notice>,
}

impl MappingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_metadata(self, path: &Utf8Path) -> Result<Self, SampleError> {
        Ok(self.metadata(MetadataTable::load(path)?))
    }

    pub fn metadata(mut self, table: MetadataTable) -> Self {
        self.notices.extend(table.notices.iter().cloned());

        for row in &table.rows {
            let Some(id) = table.id_of(row) else {
                continue;
            };
            let date = table
                .date_column
                .and_then(|idx| row.get(idx))
                .map(str::to_string);
            let site = table
                .site_column
                .and_then(|idx| row.get(idx))
                .filter(|site| !site.is_empty())
                .map(str::to_string);

            let mut record = SampleRecord {
                id: id.clone(),
                date,
                site: site.clone(),
                columns: Vec::new(),
                labels: Vec::new(),
            };
            for &idx in &table.label_columns {
                let Some(raw) = row.get(idx) else {
                    continue;
                };
                let value = sanitize(raw);
                record.columns.push(Column {
                    header: table.header[idx].clone(),
                    value: value.clone(),
                });
                record.labels.push(value.clone());
                if let Some(site) = &site {
                    let label = Label::new(&table.header[idx], &value);
                    if let Err(kind) = self.add_label(site, label) {
                        self.notices
                            .push(Notice::new(kind).sample(&id).path(&table.origin));
                    }
                }
            }

            if self.samples.insert(id.clone(), record).is_some() {
                warn!(id = %id, "duplicate sample id in metadata");
                self.notices.push(
                    Notice::new(NoticeKind::DuplicateSample)
                        .sample(&id)
                        .path(&table.origin),
                );
            }
        }

        self.table = Some(table);
        self
    }

    pub fn load_site_labels(self, path: &Utf8Path) -> Result<Self, SampleError> {
        self.site_labels_from_reader(table::open(path)?, path)
    }

    /// Site label table: `id_pattern`, `siteId`, then one column per label group.
    pub fn site_labels_from_reader<R: Read>(
        mut self,
        source: R,
        origin: &Utf8Path,
    ) -> Result<Self, SampleError> {
        let mut rows = table::read_rows(source)?.into_iter();
        let header_row = rows
            .next()
            .ok_or_else(|| SampleError::EmptyTable(origin.to_path_buf()))?;
        let tags: Vec<String> = header_row
            .fields
            .iter()
            .map(|tag| tag.to_lowercase())
            .collect();
        let valid = tags.len() >= 2 && tags[0] == "id_pattern" && tags[1] == "siteid";
        if !valid {
            return Err(SampleError::InvalidSiteTable {
                path: origin.to_path_buf(),
                found: header_row.fields.join(", "),
            });
        }
        let primary = tags.iter().rposition(|tag| tag == "siteid").unwrap_or(1);

        for row in rows {
            let Some(site) = row.get(primary).filter(|site| !site.is_empty()) else {
                self.notices
                    .push(Notice::new(NoticeKind::MalformedRow { line: row.line }).path(origin));
                continue;
            };
            let site = site.to_string();
            self.sites.entry(site.clone()).or_default();
            for (idx, value) in row.fields.iter().enumerate() {
                if idx == 0 || idx == primary || idx >= header_row.fields.len() {
                    continue;
                }
                let label = Label::new(&header_row.fields[idx], value);
                if let Err(kind) = self.add_label(&site, label) {
                    warn!(line = row.line, "unusable site label in {origin}");
                    self.notices.push(Notice::new(kind).path(origin));
                }
            }
        }
        Ok(self)
    }

    fn add_label(&mut self, site: &str, label: Label) -> Result<(), NoticeKind> {
        if label.label.is_empty() {
            return Ok(());
        }
        if !label.is_path_safe() {
            return Err(NoticeKind::InvalidLabel {
                group: label.group,
                label: label.label,
            });
        }
        let labels = match self.sites.entry(site.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Vec::new()),
        };
        if !labels.contains(&label) {
            labels.push(label);
        }
        Ok(())
    }

    pub fn build(self) -> Mapping {
        Mapping {
            samples: self.samples,
            sites: self.sites,
            table: self.table,
            notices: self.notices,
        }
    }
}

#[derive(Debug)]
pub struct Mapping {
    samples: BTreeMap<SampleId, SampleRecord>,
    sites: BTreeMap<String, Vec<Label>>,
    table: Option<MetadataTable>,
    notices: Vec<Notice>,
}

impl Mapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::new()
    }

    pub fn load(metadata: &Utf8Path, sites: Option<&Utf8Path>) -> Result<Self, SampleError> {
        let mut builder = Self::builder().load_metadata(metadata)?;
        if let Some(sites) = sites {
            builder = builder.load_site_labels(sites)?;
        }
        Ok(builder.build())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample(&self, id: &SampleId) -> Option<&SampleRecord> {
        self.samples.get(id)
    }

    pub fn table(&self) -> Option<&MetadataTable> {
        self.table.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn date(&self, id: &SampleId, mode: IdMode) -> Result<CollectionDate, ResolveError> {
        match mode {
            IdMode::Legacy => {
                CollectionDate::from_legacy_id(id).ok_or_else(|| ResolveError::NoLegacyDate {
                    id: id.to_string(),
                })
            }
            IdMode::Current => {
                let record = self.sample(id).ok_or_else(|| ResolveError::UnknownSample {
                    id: id.to_string(),
                })?;
                let raw = record.date.clone().unwrap_or_default();
                CollectionDate::parse_sheet(&raw).ok_or(ResolveError::UnparseableDate { raw })
            }
        }
    }

    pub fn site(&self, id: &SampleId) -> Result<&str, ResolveError> {
        self.sample(id)
            .and_then(|record| record.site.as_deref())
            .ok_or_else(|| ResolveError::NoSite { id: id.to_string() })
    }

    pub fn labels(&self, site: &str) -> Option<&[Label]> {
        self.sites.get(site).map(Vec::as_slice)
    }

    pub fn labels_for(&self, id: &SampleId) -> Result<&[Label], ResolveError> {
        let site = self.site(id)?;
        match self.labels(site) {
            Some(labels) if !labels.is_empty() => Ok(labels),
            _ => Err(ResolveError::NoLabels {
                site: site.to_string(),
            }),
        }
    }
}
