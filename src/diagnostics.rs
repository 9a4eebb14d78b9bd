use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ResolveError {
    #[error("ID {id} not in mapping")]
    UnknownSample { id: String },

    #[error("no site for ID {id}")]
    NoSite { id: String },

    #[error("no labels for site {site}")]
    NoLabels { site: String },

    #[error("no date from {raw:?}")]
    UnparseableDate { raw: String },

    #[error("no date in legacy ID {id}")]
    NoLegacyDate { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoticeKind {
    NoSampleId,
    AmbiguousSampleId { alternate: String },
    Unresolved { error: ResolveError },
    TargetExists,
    LinkFailed { reason: String },
    DirectoryFailed { reason: String },
    ParseFailed { reason: String },
    LengthMismatch { lineages: usize, abundances: usize },
    MissingCoverage,
    MissingSummary,
    MissingKey,
    DuplicateSample,
    MalformedRow { line: usize },
    InvalidLabel { group: String, label: String },
    Unreadable { reason: String },
    ContentOutsideSection,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::NoSampleId => write!(f, "no sample ID in file name"),
            NoticeKind::AmbiguousSampleId { alternate } => {
                write!(f, "file name also parses as ID {alternate}, review manually")
            }
            NoticeKind::Unresolved { error } => write!(f, "{error}"),
            NoticeKind::TargetExists => write!(f, "target exists, skipping"),
            NoticeKind::LinkFailed { reason } => write!(f, "hard link failed: {reason}"),
            NoticeKind::DirectoryFailed { reason } => {
                write!(f, "cannot create directory: {reason}")
            }
            NoticeKind::ParseFailed { reason } => write!(f, "parse failed: {reason}"),
            NoticeKind::LengthMismatch {
                lineages,
                abundances,
            } => write!(
                f,
                "{lineages} lineages but {abundances} abundances, lineage map left empty"
            ),
            NoticeKind::MissingCoverage => write!(f, "can not find coverage"),
            NoticeKind::MissingSummary => write!(f, "no demix summary"),
            NoticeKind::MissingKey => write!(f, "key not in mapping"),
            NoticeKind::DuplicateSample => write!(f, "duplicate sample ID, later row wins"),
            NoticeKind::MalformedRow { line } => {
                write!(f, "line {line} is missing columns, ignored")
            }
            NoticeKind::InvalidLabel { group, label } => {
                write!(f, "label {group:?}/{label:?} is not a usable directory, ignored")
            }
            NoticeKind::Unreadable { reason } => write!(f, "cannot read entry: {reason}"),
            NoticeKind::ContentOutsideSection => write!(f, "content before any section tag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub sample: Option<String>,
    pub path: Option<Utf8PathBuf>,
    #[serde(flatten)]
    pub kind: NoticeKind,
}

impl Notice {
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            sample: None,
            path: None,
            kind,
        }
    }

    pub fn sample(mut self, sample: impl fmt::Display) -> Self {
        self.sample = Some(sample.to_string());
        self
    }

    pub fn path(mut self, path: &Utf8Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            NoticeKind::LinkFailed { .. }
                | NoticeKind::DirectoryFailed { .. }
                | NoticeKind::ParseFailed { .. }
                | NoticeKind::Unreadable { .. }
        )
    }
}

impl From<ResolveError> for NoticeKind {
    fn from(error: ResolveError) -> Self {
        NoticeKind::Unresolved { error }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sample) = &self.sample {
            write!(f, "[{sample}] ")?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(path) = &self.path {
            write!(f, " ({path})")?;
        }
        Ok(())
    }
}
