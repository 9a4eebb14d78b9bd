use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SampleError {
    #[error("no such file: {0}")]
    MissingInput(Utf8PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    #[error("missing required argument: {0}")]
    #[diagnostic(help("pass it on the command line or set it in wwsm.json"))]
    MissingArgument(&'static str),

    #[error("table has no header line: {0}")]
    EmptyTable(Utf8PathBuf),

    #[error("not a valid site mapping file, missing id_pattern and siteId: {path} (header: {found})")]
    #[diagnostic(help("the first two header columns must read `id_pattern` and `siteId`"))]
    InvalidSiteTable { path: Utf8PathBuf, found: String },

    #[error("cannot parse demix report {path}: {reason}")]
    InvalidDemix { path: Utf8PathBuf, reason: String },

    #[error("column {column} is outside the table width {width}")]
    ColumnOutOfRange { column: usize, width: usize },

    #[error("invalid column index: {0} (columns are numbered from 1)")]
    InvalidColumn(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid threshold {0}: must lie within [0, 1]")]
    InvalidThreshold(f64),

    #[error("table error: {0}")]
    Table(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to serialize report: {0}")]
    Serialize(String),
}

impl From<csv::Error> for SampleError {
    fn from(err: csv::Error) -> Self {
        SampleError::Table(err.to_string())
    }
}
