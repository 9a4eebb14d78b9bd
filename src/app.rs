use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::info;

use crate::aggregate::{AggregateOptions, AggregateReport, Aggregator};
use crate::compare::{self, ComparisonReport};
use crate::config::{ResolvedConfig, validate_threshold};
use crate::demix::{self, DemixRecord};
use crate::diagnostics::Notice;
use crate::domain::{CollectionDate, IdMode, SampleId};
use crate::error::SampleError;
use crate::mapping::{Mapping, MetadataTable};
use crate::merge::{self, MergeOptions, MergedTable};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Default)]
pub struct MappingInputs {
    pub mapping_file: Option<Utf8PathBuf>,
    pub sites_file: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct LinkRequest {
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub tables: MappingInputs,
    pub id_mode: Option<IdMode>,
    pub suffix: Option<String>,
    pub date_prefix: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichRequest {
    pub mapping_file: Option<Utf8PathBuf>,
    pub coverage_file: Option<Utf8PathBuf>,
    pub demix_dir: Option<Utf8PathBuf>,
    pub id_mode: Option<IdMode>,
}

#[derive(Debug, Clone)]
pub struct CompareRequest {
    pub v1_dir: Utf8PathBuf,
    pub v2_dir: Utf8PathBuf,
    pub threshold: Option<f64>,
    pub analysis_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResult {
    #[serde(flatten)]
    pub report: ComparisonReport,
    pub artifacts: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DemixRow {
    pub id: String,
    pub date: Option<CollectionDate>,
    pub location: String,
    pub record: DemixRecord,
    pub notices: Vec<Notice>,
}

impl DemixRow {
    pub fn fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.id.clone(),
            self.date.map(|date| date.to_string()).unwrap_or_default(),
            self.location.clone(),
        ];
        fields.extend(self.record.summary_fields());
        fields
    }
}

#[derive(Debug, Clone, Default)]
pub struct App {
    config: ResolvedConfig,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    fn id_mode(&self, requested: Option<IdMode>) -> IdMode {
        requested.unwrap_or(self.config.id_mode)
    }

    fn mapping_file(&self, requested: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
        requested
            .map(Utf8Path::to_path_buf)
            .or_else(|| self.config.mapping_file.clone())
    }

    fn load_mapping(&self, tables: &MappingInputs) -> Result<Mapping, SampleError> {
        let metadata = self
            .mapping_file(tables.mapping_file.as_deref())
            .ok_or(SampleError::MissingArgument("mapping file"))?;
        let sites = tables
            .sites_file
            .clone()
            .or_else(|| self.config.sites_file.clone());
        let mapping = Mapping::load(&metadata, sites.as_deref())?;
        info!(samples = mapping.len(), "loaded sample mapping from {metadata}");
        Ok(mapping)
    }

    fn link_options(&self, request: &LinkRequest, default_suffix: &str) -> AggregateOptions {
        AggregateOptions {
            id_mode: self.id_mode(request.id_mode),
            suffix: request
                .suffix
                .clone()
                .or_else(|| self.config.suffix.clone())
                .unwrap_or_else(|| default_suffix.to_string()),
            date_prefix: request.date_prefix || self.config.date_prefix,
            dry_run: request.dry_run,
        }
    }

    pub fn aggregate(
        &self,
        request: &LinkRequest,
        sink: &dyn ProgressSink,
    ) -> Result<AggregateReport, SampleError> {
        let mapping = self.load_mapping(&request.tables)?;
        let options = self.link_options(request, ".out");
        let mut report = Aggregator::new(&mapping, options).by_labels(
            &request.source,
            &request.destination,
            sink,
        )?;
        prepend_notices(&mut report.notices, mapping.notices());
        Ok(report)
    }

    pub fn stage(
        &self,
        request: &LinkRequest,
        sink: &dyn ProgressSink,
    ) -> Result<AggregateReport, SampleError> {
        let mapping = self.load_mapping(&request.tables)?;
        let mode = self.id_mode(request.id_mode);
        let options = self.link_options(request, mode.default_suffix());
        let mut report = Aggregator::new(&mapping, options).by_date(
            &request.source,
            &request.destination,
            sink,
        )?;
        prepend_notices(&mut report.notices, mapping.notices());
        Ok(report)
    }

    pub fn demix_row(
        &self,
        path: &Utf8Path,
        mapping_file: Option<&Utf8Path>,
    ) -> Result<DemixRow, SampleError> {
        if !path.is_file() {
            return Err(SampleError::MissingInput(path.to_path_buf()));
        }
        let record = demix::parse_file(path).map_err(|err| SampleError::InvalidDemix {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let name = path.file_name().unwrap_or_default();
        let mode = self.id_mode(None);
        let id = mode
            .extractor(".out")
            .extract(name)
            .map(|found| found.id)
            .unwrap_or_else(|| SampleId::new(name));
        let date = match mode {
            IdMode::Current => CollectionDate::from_run_prefix(name),
            IdMode::Legacy => CollectionDate::from_legacy_id(&id),
        };

        let mut notices = Vec::new();
        let mut location = id.to_string();
        if let Some(file) = self.mapping_file(mapping_file) {
            let mapping = Mapping::load(&file, self.config.sites_file.as_deref())?;
            notices.extend(mapping.notices().iter().cloned());
            match mapping.labels_for(&id) {
                Ok(labels) => {
                    if let Some(label) = labels.first() {
                        location = label.label.clone();
                    }
                }
                Err(err) => notices.push(Notice::new(err.into()).sample(&id).path(path)),
            }
        }
        notices.extend(
            record
                .warnings
                .iter()
                .map(|warning| Notice::new(warning.clone()).sample(&id).path(path)),
        );

        Ok(DemixRow {
            id: id.to_string(),
            date,
            location,
            record,
            notices,
        })
    }

    pub fn enrich(
        &self,
        request: &EnrichRequest,
        sink: &dyn ProgressSink,
    ) -> Result<MergedTable, SampleError> {
        let start = Instant::now();
        let mode = self.id_mode(request.id_mode);
        let metadata_path = self
            .mapping_file(request.mapping_file.as_deref())
            .ok_or(SampleError::MissingArgument("mapping file"))?;
        let metadata = MetadataTable::load(&metadata_path)?;
        let mut notices = metadata.notices().to_vec();

        let coverage = match &request.coverage_file {
            Some(path) => {
                let (coverage, found) = merge::read_coverage(path, mode)?;
                notices.extend(found);
                Some(coverage)
            }
            None => None,
        };
        let summaries = match &request.demix_dir {
            Some(dir) => {
                sink.event(ProgressEvent {
                    message: format!("phase=Parse; {dir}"),
                    elapsed: None,
                });
                let scan = demix::scan_dir(dir, mode)?;
                notices.extend(scan.notices);
                Some(scan.records)
            }
            None => None,
        };

        let mut table = merge::enrich(&metadata, coverage.as_ref(), summaries.as_ref());
        prepend_notices(&mut table.notices, &notices);
        sink.event(ProgressEvent {
            message: format!("phase=Done; rows={}", table.rows.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok(table)
    }

    pub fn merge(
        &self,
        a: &Utf8Path,
        b: &Utf8Path,
        options: &MergeOptions,
    ) -> Result<MergedTable, SampleError> {
        merge::merge_files(a, b, options)
    }

    pub fn compare(
        &self,
        request: &CompareRequest,
        sink: &dyn ProgressSink,
    ) -> Result<CompareResult, SampleError> {
        let threshold = request.threshold.unwrap_or(self.config.threshold);
        validate_threshold(threshold)?;
        let report = compare::compare_dirs(&request.v1_dir, &request.v2_dir, threshold, sink)?;
        let artifacts = match &request.analysis_dir {
            Some(dir) => {
                crate::fs_util::ensure_dir(dir)
                    .map_err(|err| SampleError::Filesystem(format!("{dir}: {err}")))?;
                report.write_artifacts(dir)?
            }
            None => Vec::new(),
        };
        Ok(CompareResult { report, artifacts })
    }
}

fn prepend_notices(notices: &mut Vec<Notice>, earlier: &[Notice]) {
    if earlier.is_empty() {
        return;
    }
    let later = std::mem::take(notices);
    notices.extend(earlier.iter().cloned());
    notices.extend(later);
}
