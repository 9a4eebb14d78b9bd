use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use ww_sample_manager::aggregate::{AggregateOptions, Aggregator, LinkAction};
use ww_sample_manager::app::{App, LinkRequest, MappingInputs, ProgressEvent, ProgressSink};
use ww_sample_manager::diagnostics::{NoticeKind, ResolveError};
use ww_sample_manager::domain::IdMode;
use ww_sample_manager::error::SampleError;
use ww_sample_manager::mapping::Mapping;

struct Quiet;

impl ProgressSink for Quiet {
    fn event(&self, _event: ProgressEvent) {}
}

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("source/run1")).unwrap();
        fs::create_dir_all(root.join("dest")).unwrap();
        fs::write(
            root.join("metadata.tsv"),
            "sample_id\tsample_collect_date\tsite_id\twwtp_name\n\
             S001\t2025-03-10\tSiteA\tPlantA\n\
             S002\t3/11/25\tSiteB\tPlantB\n",
        )
        .unwrap();
        fs::write(
            root.join("sites.tsv"),
            "id_pattern\tsiteId\tCounty\nS*\tSiteA\tNorth\n",
        )
        .unwrap();
        Self { _dir: dir, root }
    }

    fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    fn write(&self, relative: &str, content: &str) -> Utf8PathBuf {
        let path = self.path(relative);
        fs::write(&path, content).unwrap();
        path
    }

    fn mapping(&self) -> Mapping {
        Mapping::load(&self.path("metadata.tsv"), Some(self.path("sites.tsv").as_path())).unwrap()
    }

    fn request(&self) -> LinkRequest {
        LinkRequest {
            source: self.path("source"),
            destination: self.path("dest"),
            tables: MappingInputs {
                mapping_file: Some(self.path("metadata.tsv")),
                sites_file: Some(self.path("sites.tsv")),
            },
            ..LinkRequest::default()
        }
    }
}

fn listing(root: &Utf8Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    entries.sort();
    entries
}

#[test]
fn links_into_label_tree() {
    let ws = Workspace::new();
    ws.write("source/run1/250310_S001.out", "demix output");

    let report = App::default().aggregate(&ws.request(), &Quiet).unwrap();

    for subdir in ["out", "data"] {
        let target = ws.path(&format!("dest/County/North/{subdir}/250310_S001.out"));
        assert!(target.is_file(), "missing {target}");
        assert_eq!(fs::read_to_string(&target).unwrap(), "demix output");
    }
    assert!(ws.path("dest/wwtp_name/PlantA/out/250310_S001.out").is_file());
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.failures(), 0);
    assert_eq!(report.count(LinkAction::Linked), report.links.len());
}

#[test]
fn rerun_leaves_tree_unchanged() {
    let ws = Workspace::new();
    ws.write("source/run1/250310_S001.out", "first");
    let app = App::default();

    let first = app.aggregate(&ws.request(), &Quiet).unwrap();
    let before = listing(&ws.path("dest"));

    let second = app.aggregate(&ws.request(), &Quiet).unwrap();

    assert_eq!(listing(&ws.path("dest")), before);
    assert_eq!(second.count(LinkAction::Linked), 0);
    assert_eq!(second.count(LinkAction::Exists), first.links.len());
    assert_eq!(second.failures(), 0);
    assert!(
        second
            .notices
            .iter()
            .any(|notice| notice.kind == NoticeKind::TargetExists)
    );
}

#[test]
fn unresolved_samples_are_skipped_with_notices() {
    let ws = Workspace::new();
    ws.write("source/run1/250310_S001.out", "ok");
    ws.write("source/run1/250311_S999.out", "unknown sample");
    ws.write("source/run1/250311_S002.out", "site without labels beyond its own");

    let mapping = ws.mapping();
    let aggregator = Aggregator::new(&mapping, AggregateOptions::default());
    let report = aggregator
        .by_labels(&ws.path("source"), &ws.path("dest"), &Quiet)
        .unwrap();

    assert_eq!(report.files_scanned, 3);
    let unknown = report
        .notices
        .iter()
        .find(|notice| {
            notice.sample.as_deref() == Some("S999")
                && matches!(notice.kind, NoticeKind::Unresolved { .. })
        })
        .unwrap();
    assert_matches!(
        &unknown.kind,
        NoticeKind::Unresolved {
            error: ResolveError::NoSite { .. }
        }
    );
    assert!(report.links.iter().all(|link| link.sample != "S999"));
    assert!(ws.path("dest/wwtp_name/PlantB/data/250311_S002.out").is_file());
    assert!(!ws.path("dest/County/North/out/250311_S002.out").exists());
}

#[test]
fn failed_link_is_reported_and_batch_continues() {
    let ws = Workspace::new();
    // 255 bytes is the longest file name; the date prefix pushes the link name past it.
    let long_name = format!("250310_S001_{}.out", "x".repeat(239));
    assert_eq!(long_name.len(), 255);
    ws.write(&format!("source/run1/{long_name}"), "too long to prefix");
    ws.write("source/run1/250311_S002.out", "fine");
    let request = LinkRequest {
        date_prefix: true,
        ..ws.request()
    };

    let report = App::default().aggregate(&request, &Quiet).unwrap();

    assert_eq!(report.files_scanned, 2);
    let failed = report
        .notices
        .iter()
        .find(|notice| matches!(notice.kind, NoticeKind::LinkFailed { .. }))
        .unwrap();
    assert_eq!(failed.sample.as_deref(), Some("S001"));
    assert!(report.failures() > 0);
    assert!(
        report
            .links
            .iter()
            .filter(|link| link.sample == "S001")
            .all(|link| link.action == LinkAction::Failed)
    );
    assert!(report.count(LinkAction::Failed) > 0);
    assert!(
        ws.path("dest/wwtp_name/PlantB/out/20250311.250311_S002.out")
            .is_file()
    );
    assert!(
        report
            .links
            .iter()
            .any(|link| link.sample == "S002" && link.action == LinkAction::Linked)
    );
}

#[cfg(unix)]
#[test]
fn non_utf8_source_names_are_reported() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let ws = Workspace::new();
    let raw = ws
        .path("source/run1")
        .as_std_path()
        .join(OsStr::from_bytes(b"250310_S001\xff.out"));
    fs::write(raw, "unnamed").unwrap();

    let report = App::default().aggregate(&ws.request(), &Quiet).unwrap();
    assert_eq!(report.files_scanned, 0);
    assert_matches!(
        report.notices.as_slice(),
        [notice] if matches!(notice.kind, NoticeKind::Unreadable { .. })
    );
    assert_eq!(report.failures(), 1);
}

#[test]
fn date_prefix_names_links_by_collection_date() {
    let ws = Workspace::new();
    ws.write("source/run1/250310_S001.out", "x");
    let request = LinkRequest {
        date_prefix: true,
        ..ws.request()
    };

    App::default().aggregate(&request, &Quiet).unwrap();
    assert!(
        ws.path("dest/County/North/out/20250310.250310_S001.out")
            .is_file()
    );
}

#[test]
fn dry_run_plans_without_touching_disk() {
    let ws = Workspace::new();
    ws.write("source/run1/250310_S001.out", "x");
    let request = LinkRequest {
        dry_run: true,
        ..ws.request()
    };

    let report = App::default().aggregate(&request, &Quiet).unwrap();
    assert!(report.count(LinkAction::Planned) > 0);
    assert!(listing(&ws.path("dest")).is_empty());
}

#[test]
fn missing_destination_is_fatal() {
    let ws = Workspace::new();
    let request = LinkRequest {
        destination: ws.path("nowhere"),
        ..ws.request()
    };
    assert_matches!(
        App::default().aggregate(&request, &Quiet),
        Err(SampleError::NotADirectory(_))
    );
}

#[test]
fn stage_links_by_date() {
    let ws = Workspace::new();
    ws.write("source/run1/250310_S001.bam", "bam");
    ws.write("source/run1/250311_S002.bam", "bam");
    ws.write("source/run1/250311_S002.bam.bai", "index");

    let report = App::default().stage(&ws.request(), &Quiet).unwrap();
    assert_eq!(report.files_scanned, 2);
    assert!(ws.path("dest/20250310.250310_S001.bam").is_file());
    assert!(ws.path("dest/20250311.250311_S002.bam").is_file());
}

#[test]
fn legacy_stage_reads_date_from_id() {
    let ws = Workspace::new();
    ws.write("source/run1/011022-9-C-1_S92.sorted.bam", "bam");
    let request = LinkRequest {
        id_mode: Some(IdMode::Legacy),
        ..ws.request()
    };

    let report = App::default().stage(&request, &Quiet).unwrap();
    assert_eq!(report.count(LinkAction::Linked), 1);
    assert!(
        ws.path("dest/20220110.011022-9-C-1_S92.sorted.bam")
            .is_file()
    );
}
