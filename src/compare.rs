use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::demix::{self, DemixRecord};
use crate::diagnostics::{Notice, NoticeKind};
use crate::error::SampleError;
use crate::fs_util;
use crate::table;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

pub fn jaccard<S: AsRef<str>>(a: &[S], b: &[S]) -> Option<f64> {
    let a: BTreeSet<&str> = a.iter().map(AsRef::as_ref).collect();
    let b: BTreeSet<&str> = b.iter().map(AsRef::as_ref).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return None;
    }
    let intersection = a.intersection(&b).count();
    Some(intersection as f64 / union as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleComparison {
    pub sample: String,
    pub v1_lineages: usize,
    pub v2_lineages: usize,
    pub v1_dominant: Option<String>,
    pub v2_dominant: Option<String>,
    pub dominant_match: bool,
    pub v1_dominant_abundance: f64,
    pub v2_dominant_abundance: f64,
    pub jaccard_similarity: Option<f64>,
}

impl SampleComparison {
    pub fn new(sample: &str, v1: &DemixRecord, v2: &DemixRecord) -> Self {
        let v1_dominant = v1.dominant_lineage().map(str::to_string);
        let v2_dominant = v2.dominant_lineage().map(str::to_string);
        Self {
            sample: sample.to_string(),
            v1_lineages: v1.lineages.len(),
            v2_lineages: v2.lineages.len(),
            dominant_match: v1_dominant == v2_dominant,
            v1_dominant,
            v2_dominant,
            v1_dominant_abundance: v1.dominant_abundance().unwrap_or(0.0),
            v2_dominant_abundance: v2.dominant_abundance().unwrap_or(0.0),
            jaccard_similarity: jaccard(&v1.lineages, &v2.lineages),
        }
    }

    pub fn is_low_similarity(&self, threshold: f64) -> bool {
        self.jaccard_similarity
            .is_some_and(|similarity| similarity < threshold)
    }

    /// Different dominant calls take precedence over low similarity as the stated reason.
    pub fn discordance(&self, threshold: f64) -> Option<String> {
        if !self.dominant_match {
            Some("Different dominant".to_string())
        } else if self.is_low_similarity(threshold) {
            Some(format!("Low similarity (<{threshold})"))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscordantSample {
    pub comparison: SampleComparison,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConcordanceMetrics {
    pub total_samples_compared: usize,
    pub dominant_lineage_concordance: f64,
    pub mean_jaccard_similarity: f64,
    pub samples_with_perfect_match: usize,
    pub samples_with_different_dominant: usize,
    pub mean_lineages_v1: f64,
    pub mean_lineages_v2: f64,
}

impl ConcordanceMetrics {
    pub fn from_comparisons(comparisons: &[SampleComparison]) -> Self {
        let total = comparisons.len();
        if total == 0 {
            return Self::default();
        }
        let matches = comparisons.iter().filter(|c| c.dominant_match).count();
        let similarities: Vec<f64> = comparisons
            .iter()
            .filter_map(|c| c.jaccard_similarity)
            .collect();

        Self {
            total_samples_compared: total,
            dominant_lineage_concordance: matches as f64 / total as f64 * 100.0,
            mean_jaccard_similarity: mean(&similarities),
            samples_with_perfect_match: similarities.iter().filter(|&&s| s == 1.0).count(),
            samples_with_different_dominant: total - matches,
            mean_lineages_v1: comparisons.iter().map(|c| c.v1_lineages).sum::<usize>() as f64
                / total as f64,
            mean_lineages_v2: comparisons.iter().map(|c| c.v2_lineages).sum::<usize>() as f64
                / total as f64,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleOverlap {
    pub only_in_v1: Vec<String>,
    pub only_in_v2: Vec<String>,
    pub common_samples: usize,
    pub v1_total: usize,
    pub v2_total: usize,
}

/// Files that failed to parse keep their error so overlap counts still see them.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: BTreeMap<String, Result<DemixRecord, String>>,
    pub notices: Vec<Notice>,
}

impl Snapshot {
    pub fn insert(&mut self, sample: impl Into<String>, record: Result<DemixRecord, String>) {
        self.records.insert(sample.into(), record);
    }

    pub fn load(dir: &Utf8Path) -> Result<Self, SampleError> {
        let scan = fs_util::find_files(dir, ".out", Some(1))?;
        let mut snapshot = Self {
            notices: scan.notices,
            ..Self::default()
        };
        for path in scan.files {
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let record = demix::parse_file(&path).map_err(|err| err.to_string());
            snapshot.insert(stem, record);
        }
        Ok(snapshot)
    }

    fn names(&self) -> BTreeSet<&str> {
        self.records.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub analysis_date: String,
    pub threshold: f64,
    pub missing_samples: SampleOverlap,
    pub concordance_metrics: ConcordanceMetrics,
    pub discordant_samples: Vec<DiscordantSample>,
    pub discordant_different_dominant: usize,
    pub discordant_low_similarity: usize,
    #[serde(skip)]
    pub comparisons: Vec<SampleComparison>,
    pub notices: Vec<Notice>,
}

pub fn compare_snapshots(v1: &Snapshot, v2: &Snapshot, threshold: f64) -> ComparisonReport {
    let v1_names = v1.names();
    let v2_names = v2.names();
    let common: Vec<&str> = v1_names.intersection(&v2_names).copied().collect();
    let overlap = SampleOverlap {
        only_in_v1: v1_names.difference(&v2_names).map(|s| s.to_string()).collect(),
        only_in_v2: v2_names.difference(&v1_names).map(|s| s.to_string()).collect(),
        common_samples: common.len(),
        v1_total: v1_names.len(),
        v2_total: v2_names.len(),
    };

    let mut notices: Vec<Notice> = v1.notices.iter().chain(&v2.notices).cloned().collect();
    let mut comparisons = Vec::new();
    for sample in common {
        let (Some(first), Some(second)) = (v1.records.get(sample), v2.records.get(sample)) else {
            continue;
        };
        match (first, second) {
            (Ok(first), Ok(second)) => {
                comparisons.push(SampleComparison::new(sample, first, second));
            }
            (Err(reason), _) | (_, Err(reason)) => notices.push(
                Notice::new(NoticeKind::ParseFailed {
                    reason: reason.clone(),
                })
                .sample(sample),
            ),
        }
    }

    let discordant_samples: Vec<DiscordantSample> = comparisons
        .iter()
        .filter_map(|comparison| {
            comparison
                .discordance(threshold)
                .map(|reason| DiscordantSample {
                    comparison: comparison.clone(),
                    reason,
                })
        })
        .collect();
    let discordant_different_dominant = discordant_samples
        .iter()
        .filter(|d| !d.comparison.dominant_match)
        .count();
    let discordant_low_similarity = discordant_samples
        .iter()
        .filter(|d| d.comparison.is_low_similarity(threshold))
        .count();

    ComparisonReport {
        analysis_date: chrono::Utc::now().to_rfc3339(),
        threshold,
        missing_samples: overlap,
        concordance_metrics: ConcordanceMetrics::from_comparisons(&comparisons),
        discordant_samples,
        discordant_different_dominant,
        discordant_low_similarity,
        comparisons,
        notices,
    }
}

pub fn compare_dirs(
    v1_dir: &Utf8Path,
    v2_dir: &Utf8Path,
    threshold: f64,
    sink: &dyn ProgressSink,
) -> Result<ComparisonReport, SampleError> {
    let start = Instant::now();
    sink.event(ProgressEvent {
        message: format!("phase=Parse; {v1_dir}"),
        elapsed: None,
    });
    let v1 = Snapshot::load(v1_dir)?;
    sink.event(ProgressEvent {
        message: format!("phase=Parse; {v2_dir}"),
        elapsed: None,
    });
    let v2 = Snapshot::load(v2_dir)?;
    let report = compare_snapshots(&v1, &v2, threshold);
    sink.event(ProgressEvent {
        message: format!(
            "phase=Done; compared={} discordant={}",
            report.concordance_metrics.total_samples_compared,
            report.discordant_samples.len()
        ),
        elapsed: Some(start.elapsed()),
    });
    Ok(report)
}

const TABLE_HEADER: [&str; 9] = [
    "sample",
    "v1_lineages",
    "v2_lineages",
    "v1_dominant",
    "v2_dominant",
    "dominant_match",
    "v1_dominant_abundance",
    "v2_dominant_abundance",
    "jaccard_similarity",
];

fn table_fields(c: &SampleComparison) -> Vec<String> {
    vec![
        c.sample.clone(),
        c.v1_lineages.to_string(),
        c.v2_lineages.to_string(),
        c.v1_dominant.clone().unwrap_or_default(),
        c.v2_dominant.clone().unwrap_or_default(),
        c.dominant_match.to_string(),
        c.v1_dominant_abundance.to_string(),
        c.v2_dominant_abundance.to_string(),
        c.jaccard_similarity.map(|s| s.to_string()).unwrap_or_default(),
    ]
}

impl ComparisonReport {
    pub fn comparison_table(&self) -> Result<Vec<u8>, SampleError> {
        let mut writer = table::writer(Vec::new());
        writer.write_record(TABLE_HEADER)?;
        for comparison in &self.comparisons {
            writer.write_record(table_fields(comparison))?;
        }
        writer
            .into_inner()
            .map_err(|err| SampleError::Filesystem(err.to_string()))
    }

    pub fn discordant_table(&self) -> Result<Vec<u8>, SampleError> {
        let mut writer = table::writer(Vec::new());
        writer.write_record(TABLE_HEADER.iter().chain(&["discordance_reason"]))?;
        for discordant in &self.discordant_samples {
            let mut fields = table_fields(&discordant.comparison);
            fields.push(discordant.reason.clone());
            writer.write_record(fields)?;
        }
        writer
            .into_inner()
            .map_err(|err| SampleError::Filesystem(err.to_string()))
    }

    pub fn summary_text(&self) -> String {
        let overlap = &self.missing_samples;
        let metrics = &self.concordance_metrics;
        let mut text = String::new();
        let _ = writeln!(text, "# Version comparison summary\n");
        let _ = writeln!(text, "Generated: {}\n", self.analysis_date);
        let _ = writeln!(text, "## Sample coverage\n");
        let _ = writeln!(text, "- v1 samples: {}", overlap.v1_total);
        let _ = writeln!(text, "- v2 samples: {}", overlap.v2_total);
        let _ = writeln!(text, "- common samples: {}", overlap.common_samples);
        let _ = writeln!(text, "- missing in v2: {}", list_or_none(&overlap.only_in_v1));
        let _ = writeln!(text, "- missing in v1: {}\n", list_or_none(&overlap.only_in_v2));
        let _ = writeln!(text, "## Concordance\n");
        let _ = writeln!(
            text,
            "- dominant lineage concordance: {:.2}%",
            metrics.dominant_lineage_concordance
        );
        let _ = writeln!(
            text,
            "- mean Jaccard similarity: {:.3}",
            metrics.mean_jaccard_similarity
        );
        let _ = writeln!(
            text,
            "- samples with perfect match: {}",
            metrics.samples_with_perfect_match
        );
        let _ = writeln!(
            text,
            "- samples with different dominant lineage: {}",
            metrics.samples_with_different_dominant
        );
        let _ = writeln!(
            text,
            "- mean lineages detected: v1 {:.1}, v2 {:.1}\n",
            metrics.mean_lineages_v1, metrics.mean_lineages_v2
        );
        let _ = writeln!(
            text,
            "## Discordant samples (Jaccard < {} or different dominant lineage): {}\n",
            self.threshold,
            self.discordant_samples.len()
        );
        if self.discordant_samples.is_empty() {
            return text;
        }
        let _ = writeln!(
            text,
            "| # | Sample | v1 Dominant | v2 Dominant | v1 Abund | v2 Abund | Similarity |"
        );
        let _ = writeln!(
            text,
            "|---|--------|-------------|-------------|----------|----------|------------|"
        );
        for (idx, discordant) in self.discordant_samples.iter().enumerate() {
            let c = &discordant.comparison;
            let similarity = c
                .jaccard_similarity
                .map(|s| format!("{s:.4}"))
                .unwrap_or_else(|| "N/A".to_string());
            let _ = writeln!(
                text,
                "| {} | {} | {} | {} | {:.4} | {:.4} | {} |",
                idx + 1,
                c.sample,
                c.v1_dominant.as_deref().unwrap_or("-"),
                c.v2_dominant.as_deref().unwrap_or("-"),
                c.v1_dominant_abundance,
                c.v2_dominant_abundance,
                similarity
            );
        }
        text
    }

    pub fn write_artifacts(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, SampleError> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut written = Vec::new();

        let path = dir.join(format!("comparison_results_{stamp}.tsv"));
        fs_util::write_atomic(&path, &self.comparison_table()?)?;
        written.push(path);

        if !self.discordant_samples.is_empty() {
            let path = dir.join(format!("discordant_samples_{stamp}.tsv"));
            fs_util::write_atomic(&path, &self.discordant_table()?)?;
            written.push(path);
        }

        let json = serde_json::to_vec_pretty(self)
            .map_err(|err| SampleError::Serialize(err.to_string()))?;
        let path = dir.join(format!("analysis_report_{stamp}.json"));
        fs_util::write_atomic(&path, &json)?;
        written.push(path);

        let path = dir.join(format!("summary_report_{stamp}.md"));
        fs_util::write_atomic(&path, self.summary_text().as_bytes())?;
        written.push(path);

        Ok(written)
    }
}

fn list_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "None".to_string()
    } else {
        values.join(", ")
    }
}
