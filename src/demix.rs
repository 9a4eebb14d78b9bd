use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostics::{Notice, NoticeKind};
use crate::domain::{IdMode, SampleId};
use crate::error::SampleError;
use crate::fs_util;

static SECTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(summarized|lineages|abundances|resid|coverage)(?:\s+(.*))?$").unwrap()
});
static SUMMARY_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\('([^']+)',\s*([^,)\s]+)\)").unwrap());
static LINEAGE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w.\-]+").unwrap());
static NUMBER_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s,\[\]]+").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemixError {
    #[error("cannot read {path}: {reason}")]
    Io { path: Utf8PathBuf, reason: String },

    #[error("file is empty")]
    Empty,

    #[error("no section after the title line")]
    Truncated,

    #[error("unparseable number {token:?} in {section}")]
    InvalidNumber { section: Section, token: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Summarized,
    Lineages,
    Abundances,
    Resid,
    Coverage,
}

impl Section {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "summarized" => Some(Section::Summarized),
            "lineages" => Some(Section::Lineages),
            "abundances" => Some(Section::Abundances),
            "resid" => Some(Section::Resid),
            "coverage" => Some(Section::Coverage),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Summarized => "summarized",
            Section::Lineages => "lineages",
            Section::Abundances => "abundances",
            Section::Resid => "resid",
            Section::Coverage => "coverage",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DemixRecord {
    pub summarized: Vec<(String, f64)>,
    pub lineages: Vec<String>,
    pub abundances: Vec<f64>,
    pub resid: String,
    pub coverage: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<NoticeKind>,
}

impl DemixRecord {
    /// The first listed lineage, by convention the most abundant call.
    pub fn dominant_lineage(&self) -> Option<&str> {
        self.lineages.first().map(String::as_str)
    }

    pub fn dominant_abundance(&self) -> Option<f64> {
        self.abundances.first().copied()
    }

    pub fn is_aligned(&self) -> bool {
        self.lineages.len() == self.abundances.len()
    }

    pub fn lineage_abundances(&self) -> BTreeMap<String, f64> {
        if !self.is_aligned() {
            return BTreeMap::new();
        }
        self.lineages
            .iter()
            .cloned()
            .zip(self.abundances.iter().copied())
            .collect()
    }

    pub fn length_mismatch(&self) -> Option<NoticeKind> {
        (!self.is_aligned()).then(|| NoticeKind::LengthMismatch {
            lineages: self.lineages.len(),
            abundances: self.abundances.len(),
        })
    }

    pub fn summarized_field(&self) -> String {
        self.summarized
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn lineages_field(&self) -> String {
        self.lineages.join(",")
    }

    pub fn abundances_field(&self) -> String {
        self.abundances
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn summary_fields(&self) -> [String; 5] {
        [
            self.summarized_field(),
            self.lineages_field(),
            self.abundances_field(),
            self.resid.clone(),
            self.coverage.clone(),
        ]
    }
}

pub const SUMMARY_HEADER: [&str; 5] = ["summarized", "lineages", "abundances", "resid", "coverage"];

pub fn parse_str(content: &str) -> Result<DemixRecord, DemixError> {
    let mut lines = content.lines();
    if lines.next().is_none() {
        return Err(DemixError::Empty);
    }

    let mut record = DemixRecord::default();
    let mut sections: BTreeMap<Section, String> = BTreeMap::new();
    let mut current: Option<Section> = None;
    for line in lines {
        if let Some(caps) = SECTION_LINE.captures(line) {
            let Some(section) = Section::from_tag(&caps[1]) else {
                continue;
            };
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            // A repeated tag continues the section it names.
            let content = sections.entry(section).or_default();
            content.push(' ');
            content.push_str(rest);
            current = Some(section);
            continue;
        }

        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        match current {
            Some(section) => {
                let content = sections.entry(section).or_default();
                content.push(' ');
                content.push_str(stripped);
            }
            None => {
                warn!("demix content before any section tag: {stripped}");
                if !record.warnings.contains(&NoticeKind::ContentOutsideSection) {
                    record.warnings.push(NoticeKind::ContentOutsideSection);
                }
            }
        }
    }

    if sections.is_empty() {
        return Err(DemixError::Truncated);
    }

    for (section, content) in sections {
        let content = content.trim();
        match section {
            Section::Summarized => {
                for caps in SUMMARY_PAIR.captures_iter(content) {
                    let value = parse_number(section, &caps[2])?;
                    record.summarized.push((caps[1].to_string(), value));
                }
            }
            Section::Lineages => {
                record.lineages = LINEAGE_TOKEN
                    .find_iter(content)
                    .map(|m| m.as_str().to_string())
                    .collect();
            }
            Section::Abundances => {
                record.abundances = NUMBER_SEPARATOR
                    .split(content)
                    .filter(|token| !token.is_empty())
                    .map(|token| parse_number(section, token))
                    .collect::<Result<_, _>>()?;
            }
            Section::Resid => record.resid = content.to_string(),
            Section::Coverage => record.coverage = content.to_string(),
        }
    }

    if let Some(mismatch) = record.length_mismatch() {
        record.warnings.push(mismatch);
    }
    Ok(record)
}

fn parse_number(section: Section, token: &str) -> Result<f64, DemixError> {
    token.parse::<f64>().map_err(|_| DemixError::InvalidNumber {
        section,
        token: token.to_string(),
    })
}

pub fn parse_file(path: &Utf8Path) -> Result<DemixRecord, DemixError> {
    let bytes = fs::read(path.as_std_path()).map_err(|err| DemixError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    parse_str(&String::from_utf8_lossy(&bytes))
}

#[derive(Debug, Default)]
pub struct DemixScan {
    pub records: BTreeMap<SampleId, DemixRecord>,
    pub notices: Vec<Notice>,
}

pub fn scan_dir(dir: &Utf8Path, mode: IdMode) -> Result<DemixScan, SampleError> {
    let files = fs_util::find_files(dir, "", Some(1))?;
    let extractor = mode.extractor("");
    let mut scan = DemixScan {
        notices: files.notices,
        ..DemixScan::default()
    };
    for path in files.files {
        let name = path.file_name().unwrap_or_default();
        let Some(found) = extractor.extract(name) else {
            scan.notices
                .push(Notice::new(NoticeKind::NoSampleId).path(&path));
            continue;
        };
        if let Some(alternate) = &found.alternate {
            scan.notices.push(
                Notice::new(NoticeKind::AmbiguousSampleId {
                    alternate: alternate.to_string(),
                })
                .sample(&found.id)
                .path(&path),
            );
        }
        debug!(id = %found.id, path = %path, "processing demix file");
        match parse_file(&path) {
            Ok(record) => {
                for warning in &record.warnings {
                    scan.notices.push(
                        Notice::new(warning.clone())
                            .sample(&found.id)
                            .path(&path),
                    );
                }
                scan.records.insert(found.id, record);
            }
            Err(err) => scan.notices.push(
                Notice::new(NoticeKind::ParseFailed {
                    reason: err.to_string(),
                })
                .sample(&found.id)
                .path(&path),
            ),
        }
    }
    Ok(scan)
}
