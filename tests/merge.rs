use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use tempfile::TempDir;

use ww_sample_manager::app::{App, EnrichRequest, ProgressEvent, ProgressSink};
use ww_sample_manager::diagnostics::NoticeKind;
use ww_sample_manager::error::SampleError;
use ww_sample_manager::merge::{MISSING_COVERAGE, MISSING_JOIN, MergeOptions};

struct Quiet;

impl ProgressSink for Quiet {
    fn event(&self, _event: ProgressEvent) {}
}

fn scratch() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

#[test]
fn enrich_appends_coverage_and_summaries() {
    let (_dir, root) = scratch();
    let metadata = root.join("metadata.tsv");
    fs::write(
        &metadata,
        "sample_id\tsample collect date\tsite_id\n\
         S001\t3/10/2025\tSiteA\n\
         S002\t3/11/2025\tSiteB\n",
    )
    .unwrap();
    let coverage = root.join("coverage.tsv");
    fs::write(&coverage, "250310_S001_L001.bam\t97.5\n").unwrap();
    let demix_dir = root.join("demix");
    fs::create_dir(&demix_dir).unwrap();
    fs::write(
        demix_dir.join("250311_S002.out"),
        "250311_S002.bam\n\
         summarized\t[('Omicron', 1.0)]\n\
         lineages\tXBB.1.5 BA.2\n\
         abundances\t0.75 0.25\n\
         resid\t0.4\n\
         coverage\t88.0\n",
    )
    .unwrap();

    let request = EnrichRequest {
        mapping_file: Some(metadata),
        coverage_file: Some(coverage),
        demix_dir: Some(demix_dir),
        id_mode: None,
    };
    let table = App::default().enrich(&request, &Quiet).unwrap();

    let header = table.header.as_ref().unwrap();
    assert_eq!(
        header,
        &[
            "sample_id",
            "sample_collect_date",
            "site_id",
            "coverage",
            "summarized",
            "lineages",
            "abundances",
            "resid",
            "coverage",
        ]
    );
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0][3], "97.5");
    assert!(table.rows[0][4..].iter().all(|field| field == MISSING_JOIN));
    assert_eq!(table.rows[1][3], MISSING_COVERAGE);
    assert_eq!(
        table.rows[1][4..],
        ["Omicron:1", "XBB.1.5,BA.2", "0.75,0.25", "0.4", "88.0"]
    );

    let kinds: Vec<&NoticeKind> = table.notices.iter().map(|notice| &notice.kind).collect();
    assert!(kinds.contains(&&NoticeKind::MissingSummary));
    assert!(kinds.contains(&&NoticeKind::MissingCoverage));
}

#[test]
fn merge_files_joins_on_keys() {
    let (_dir, root) = scratch();
    let a = root.join("a.tsv");
    let b = root.join("b.tsv");
    fs::write(&a, "site\tcounty\nA\tCook\nB\tLake\n").unwrap();
    fs::write(&b, "sample\treads\tsite\nS1\t10\tB\nS2\t20\tC\n").unwrap();

    let options = MergeOptions {
        key_a: 1,
        key_b: Some(3),
        columns: vec![2],
        has_header: true,
    };
    let table = App::default().merge(&a, &b, &options).unwrap();
    let text = String::from_utf8(table.to_bytes().unwrap()).unwrap();
    assert_eq!(
        text,
        "sample\treads\tsite\tcounty\nS1\t10\tB\tLake\nS2\t20\tC\tN/A\n"
    );
    assert_eq!(table.notices.len(), 1);
    assert_eq!(table.notices[0].sample.as_deref(), Some("C"));
}

#[test]
fn merge_key_outside_header_is_fatal() {
    let (_dir, root) = scratch();
    let a = root.join("a.tsv");
    let b = root.join("b.tsv");
    fs::write(&a, "site\tcounty\nA\tCook\n").unwrap();
    fs::write(&b, "sample\nS1\n").unwrap();

    let options = MergeOptions {
        key_a: 1,
        key_b: Some(4),
        columns: vec![2],
        has_header: true,
    };
    assert_matches!(
        App::default().merge(&a, &b, &options),
        Err(SampleError::ColumnOutOfRange { column: 4, width: 1 })
    );
}
