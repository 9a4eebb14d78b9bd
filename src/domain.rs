use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

pub const UNSAFE_LABEL_CHARS: [char; 10] = [' ', '/', '(', ')', '\'', '`', '&', ',', '"', '\\'];

/// Different raw values can sanitize to the same string; they then share a directory.
pub fn sanitize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| {
            if UNSAFE_LABEL_CHARS.contains(&ch) {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

static RUN_DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^-_.]{6}\.([^_.]+)").unwrap());
static DIGIT_DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{6}[-_]([^_.]+)").unwrap());
static FIRST_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([^_.]+)").unwrap());
static LEGACY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})[_-]").unwrap());
static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})").unwrap());
static SHEET_DATE_US: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)/(\d+)/(\d+)").unwrap());
static SHEET_DATE_ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdMode {
    /// First `.`/`_` delimited token, after an optional six character run prefix.
    #[default]
    Current,
    /// `MMDDYY-...-...` composite id running up to the suffix.
    Legacy,
}

impl fmt::Display for IdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdMode::Current => write!(f, "current"),
            IdMode::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMatch {
    pub id: SampleId,
    // A second reading of the name that disagrees with `id`.
    pub alternate: Option<SampleId>,
}

impl IdMode {
    pub fn default_suffix(&self) -> &'static str {
        match self {
            IdMode::Current => ".bam",
            IdMode::Legacy => ".sorted.bam",
        }
    }

    /// `suffix` only takes part in legacy parsing.
    pub fn extractor(self, suffix: &str) -> IdExtractor {
        let legacy = match self {
            IdMode::Current => None,
            IdMode::Legacy => Regex::new(&legacy_pattern(suffix)).ok(),
        };
        IdExtractor { mode: self, legacy }
    }

    pub fn extract(&self, file_name: &str, suffix: &str) -> Option<IdMatch> {
        self.extractor(suffix).extract(file_name)
    }
}

#[derive(Debug, Clone)]
pub struct IdExtractor {
    mode: IdMode,
    legacy: Option<Regex>,
}

impl IdExtractor {
    pub fn mode(&self) -> IdMode {
        self.mode
    }

    pub fn extract(&self, file_name: &str) -> Option<IdMatch> {
        match self.mode {
            IdMode::Current => extract_current(file_name),
            IdMode::Legacy => {
                let id = legacy_with(self.legacy.as_ref()?, file_name)?;
                Some(IdMatch {
                    id,
                    alternate: None,
                })
            }
        }
    }
}

pub fn extract_current(file_name: &str) -> Option<IdMatch> {
    let strict = current_dotted_only(file_name);
    let relaxed = DIGIT_DATE_PREFIX
        .captures(file_name)
        .filter(|_| !RUN_DATE_PREFIX.is_match(file_name))
        .map(|caps| caps[1].to_string())
        .or_else(|| strict.clone())?;

    let alternate = strict.filter(|value| *value != relaxed).map(SampleId);
    Some(IdMatch {
        id: SampleId(relaxed),
        alternate,
    })
}

fn current_dotted_only(file_name: &str) -> Option<String> {
    let token = match RUN_DATE_PREFIX.captures(file_name) {
        Some(caps) => caps[1].to_string(),
        None => file_name.to_string(),
    };
    FIRST_TOKEN
        .captures(&token)
        .map(|caps| caps[1].to_string())
}

fn legacy_pattern(suffix: &str) -> String {
    format!(r"^(\d{{6}}[-_].+[-_].+){}", regex::escape(suffix))
}

pub fn extract_legacy(file_name: &str, suffix: &str) -> Option<SampleId> {
    let regex = Regex::new(&legacy_pattern(suffix)).ok()?;
    legacy_with(&regex, file_name)
}

fn legacy_with(regex: &Regex, file_name: &str) -> Option<SampleId> {
    let basename = match RUN_DATE_PREFIX.captures(file_name) {
        Some(caps) => caps[1].to_string(),
        None => file_name.to_string(),
    };
    regex
        .captures(&basename)
        .map(|caps| SampleId(caps[1].to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionDate(NaiveDate);

impl CollectionDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn from_legacy_id(id: &SampleId) -> Option<Self> {
        let caps = LEGACY_DATE.captures(id.as_str())?;
        from_parts(&caps[3], &caps[1], &caps[2])
    }

    pub fn from_run_prefix(file_name: &str) -> Option<Self> {
        let caps = LEADING_DIGITS.captures(file_name)?;
        from_parts(&caps[1], &caps[2], &caps[3])
    }

    /// Sample sheet dates are `M/D/Y`; ISO `YYYY-MM-DD` is accepted as well.
    pub fn parse_sheet(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(caps) = SHEET_DATE_US.captures(raw) {
            return from_parts(&caps[3], &caps[1], &caps[2]);
        }
        let caps = SHEET_DATE_ISO.captures(raw)?;
        from_parts(&caps[1], &caps[2], &caps[3])
    }
}

fn from_parts(year: &str, month: &str, day: &str) -> Option<CollectionDate> {
    let mut year: i32 = year.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    let date = NaiveDate::from_ymd_opt(year, month.parse().ok()?, day.parse().ok()?)?;
    Some(CollectionDate(date))
}

impl fmt::Display for CollectionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

impl Serialize for CollectionDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Label {
    pub group: String,
    pub label: String,
}

impl Label {
    pub fn new(group: &str, label: &str) -> Self {
        Self {
            group: sanitize(group),
            label: sanitize(label),
        }
    }

    /// Both parts must name a single real directory below the destination.
    pub fn is_path_safe(&self) -> bool {
        [&self.group, &self.label]
            .iter()
            .all(|part| !part.is_empty() && part.as_str() != "." && part.as_str() != "..")
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.label)
    }
}
