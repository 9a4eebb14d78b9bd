use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::app::{ProgressEvent, ProgressSink};
use crate::diagnostics::{Notice, NoticeKind};
use crate::domain::{IdExtractor, IdMatch, IdMode, SampleId};
use crate::error::SampleError;
use crate::fs_util::{self, LinkOutcome};
use crate::mapping::Mapping;

pub const LABEL_SUBDIRS: [&str; 2] = ["out", "data"];

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub id_mode: IdMode,
    pub suffix: String,
    pub date_prefix: bool,
    pub dry_run: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            id_mode: IdMode::Current,
            suffix: ".out".to_string(),
            date_prefix: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkAction {
    Linked,
    Exists,
    Failed,
    Planned,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkRecord {
    pub sample: String,
    pub source: Utf8PathBuf,
    pub target: Utf8PathBuf,
    pub action: LinkAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateReport {
    pub files_scanned: usize,
    pub links: Vec<LinkRecord>,
    pub notices: Vec<Notice>,
}

impl AggregateReport {
    pub fn count(&self, action: LinkAction) -> usize {
        self.links.iter().filter(|link| link.action == action).count()
    }

    pub fn failures(&self) -> usize {
        self.notices.iter().filter(|notice| notice.is_failure()).count()
    }
}

pub struct Aggregator<'a> {
    mapping: &'a Mapping,
    options: AggregateOptions,
    extractor: IdExtractor,
}

impl<'a> Aggregator<'a> {
    pub fn new(mapping: &'a Mapping, options: AggregateOptions) -> Self {
        let extractor = options.id_mode.extractor(&options.suffix);
        Self {
            mapping,
            options,
            extractor,
        }
    }

    pub fn by_labels(
        &self,
        source: &Utf8Path,
        destination: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<AggregateReport, SampleError> {
        fs_util::require_dir(destination)?;
        let start = Instant::now();
        let (files, mut report) = self.scan(source, sink)?;
        for path in &files {
            let Some(id) = self.sample_id(path, &mut report) else {
                continue;
            };
            let labels = match self.mapping.labels_for(&id) {
                Ok(labels) => labels,
                Err(err) => {
                    report
                        .notices
                        .push(Notice::new(err.into()).sample(&id).path(path));
                    continue;
                }
            };
            let Some(link_name) = self.link_name(&id, path, &mut report) else {
                continue;
            };

            debug!(id = %id, labels = labels.len(), "linking sample");
            for label in labels {
                for subdir in LABEL_SUBDIRS {
                    let dir = destination.join(&label.group).join(&label.label).join(subdir);
                    if !self.options.dry_run {
                        if let Err(err) = fs_util::ensure_dir(&dir) {
                            report.notices.push(
                                Notice::new(NoticeKind::DirectoryFailed {
                                    reason: err.to_string(),
                                })
                                .sample(&id)
                                .path(&dir),
                            );
                            continue;
                        }
                    }
                    self.link(&id, path, &dir.join(&link_name), &mut report);
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; linked={} exists={} failed={}",
                report.count(LinkAction::Linked),
                report.count(LinkAction::Exists),
                report.count(LinkAction::Failed)
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    pub fn by_date(
        &self,
        source: &Utf8Path,
        destination: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<AggregateReport, SampleError> {
        fs_util::require_dir(destination)?;
        let start = Instant::now();
        let (files, mut report) = self.scan(source, sink)?;
        for path in &files {
            let Some(id) = self.sample_id(path, &mut report) else {
                continue;
            };
            let date = match self.mapping.date(&id, self.options.id_mode) {
                Ok(date) => date,
                Err(err) => {
                    report
                        .notices
                        .push(Notice::new(err.into()).sample(&id).path(path));
                    continue;
                }
            };
            let name = path.file_name().unwrap_or_default();
            let target = destination.join(format!("{date}.{name}"));
            self.link(&id, path, &target, &mut report);
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; linked={} exists={} failed={}",
                report.count(LinkAction::Linked),
                report.count(LinkAction::Exists),
                report.count(LinkAction::Failed)
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    fn scan(
        &self,
        source: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<(Vec<Utf8PathBuf>, AggregateReport), SampleError> {
        let scan = fs_util::find_files(source, &self.options.suffix, None)?;
        sink.event(ProgressEvent {
            message: format!("phase=Scan; {} files under {source}", scan.files.len()),
            elapsed: None,
        });
        let report = AggregateReport {
            files_scanned: scan.files.len(),
            links: Vec::new(),
            notices: scan.notices,
        };
        Ok((scan.files, report))
    }

    fn sample_id(&self, path: &Utf8Path, report: &mut AggregateReport) -> Option<SampleId> {
        let name = path.file_name().unwrap_or_default();
        let Some(IdMatch { id, alternate }) = self.extractor.extract(name) else {
            report
                .notices
                .push(Notice::new(NoticeKind::NoSampleId).path(path));
            return None;
        };
        if let Some(alternate) = alternate {
            report.notices.push(
                Notice::new(NoticeKind::AmbiguousSampleId {
                    alternate: alternate.to_string(),
                })
                .sample(&id)
                .path(path),
            );
        }
        Some(id)
    }

    fn link_name(
        &self,
        id: &SampleId,
        path: &Utf8Path,
        report: &mut AggregateReport,
    ) -> Option<String> {
        let name = path.file_name().unwrap_or_default();
        if !self.options.date_prefix {
            return Some(name.to_string());
        }
        match self.mapping.date(id, self.options.id_mode) {
            Ok(date) => Some(format!("{date}.{name}")),
            Err(err) => {
                report
                    .notices
                    .push(Notice::new(err.into()).sample(id).path(path));
                None
            }
        }
    }

    fn link(
        &self,
        id: &SampleId,
        source: &Utf8Path,
        target: &Utf8Path,
        report: &mut AggregateReport,
    ) {
        let action = if self.options.dry_run {
            if target.as_std_path().exists() {
                LinkAction::Exists
            } else {
                LinkAction::Planned
            }
        } else {
            match fs_util::link_if_absent(source, target) {
                Ok(LinkOutcome::Linked) => LinkAction::Linked,
                Ok(LinkOutcome::Exists) => {
                    report
                        .notices
                        .push(Notice::new(NoticeKind::TargetExists).sample(id).path(target));
                    LinkAction::Exists
                }
                Err(err) => {
                    report.notices.push(
                        Notice::new(NoticeKind::LinkFailed {
                            reason: err.to_string(),
                        })
                        .sample(id)
                        .path(source),
                    );
                    LinkAction::Failed
                }
            }
        };
        report.links.push(LinkRecord {
            sample: id.to_string(),
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            action,
        });
    }
}
