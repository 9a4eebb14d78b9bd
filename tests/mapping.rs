use assert_matches::assert_matches;
use camino::Utf8Path;

use ww_sample_manager::diagnostics::{NoticeKind, ResolveError};
use ww_sample_manager::domain::{IdMode, Label, SampleId, UNSAFE_LABEL_CHARS, sanitize};
use ww_sample_manager::error::SampleError;
use ww_sample_manager::mapping::{Mapping, MetadataTable};

const METADATA: &str = "Sample ID\tsample_collect_date\twwtp_name\tsite_id\tnotes (free)\n\
S001\t3/10/2025\tPlant A (east)\tSiteA\tfirst\n\
S002\t12/1/24\tPlant/B\tSiteB\n\
S003\tnot a date\tPlant C\tSiteA\tthird\n";

const SITES: &str = "ID_PATTERN\tSiteID\tCounty\tRegion\n\
S0*\tSiteA\tNorth\tLakes\n\
T1*\tSiteA\tNorth County\t\n";

fn origin() -> &'static Utf8Path {
    Utf8Path::new("metadata.tsv")
}

fn mapping() -> Mapping {
    let table = MetadataTable::from_reader(METADATA.as_bytes(), origin()).unwrap();
    Mapping::builder()
        .metadata(table)
        .site_labels_from_reader(SITES.as_bytes(), Utf8Path::new("sites.tsv"))
        .unwrap()
        .build()
}

#[test]
fn header_and_values_are_sanitized() {
    let table = MetadataTable::from_reader(METADATA.as_bytes(), origin()).unwrap();
    assert_eq!(
        table.header(),
        ["Sample_ID", "sample_collect_date", "wwtp_name", "site_id", "notes__free_"]
    );
    for token in table.header() {
        assert!(!token.contains(UNSAFE_LABEL_CHARS));
        assert_eq!(sanitize(token), *token);
    }
}

#[test]
fn short_rows_are_reported_not_loaded() {
    let mapping = mapping();
    assert_eq!(mapping.len(), 2);
    assert!(mapping.sample(&SampleId::new("S002")).is_none());
    assert_matches!(
        mapping.notices()[0].kind,
        NoticeKind::MalformedRow { line: 3 }
    );
}

#[test]
fn dates_resolve_per_mode() {
    let mapping = mapping();
    let date = mapping.date(&SampleId::new("S001"), IdMode::Current).unwrap();
    assert_eq!(date.to_string(), "20250310");

    assert_matches!(
        mapping.date(&SampleId::new("S003"), IdMode::Current),
        Err(ResolveError::UnparseableDate { .. })
    );
    assert_matches!(
        mapping.date(&SampleId::new("S404"), IdMode::Current),
        Err(ResolveError::UnknownSample { .. })
    );

    let legacy = SampleId::new("011022-9-C-1_S92");
    assert_eq!(
        mapping.date(&legacy, IdMode::Legacy).unwrap().to_string(),
        "20220110"
    );
}

#[test]
fn site_labels_accumulate_across_rows() {
    let mapping = mapping();
    let labels = mapping.labels("SiteA").unwrap();
    assert!(labels.contains(&Label::new("wwtp_name", "Plant A (east)")));
    assert!(labels.contains(&Label::new("County", "North")));
    assert!(labels.contains(&Label::new("Region", "Lakes")));
    assert!(labels.contains(&Label::new("County", "North County")));
    assert_eq!(
        labels
            .iter()
            .filter(|label| label.group == "County" && label.label == "North")
            .count(),
        1
    );
    assert!(labels.iter().all(|label| !label.label.is_empty()));

    let for_sample = mapping.labels_for(&SampleId::new("S001")).unwrap();
    assert_eq!(for_sample, labels);
}

#[test]
fn unknown_site_has_no_labels() {
    let mapping = mapping();
    assert_eq!(mapping.labels("SiteZ"), None);
    assert_matches!(
        mapping.labels_for(&SampleId::new("S404")),
        Err(ResolveError::NoSite { .. })
    );
}

#[test]
fn malformed_site_table_is_fatal() {
    let table = MetadataTable::from_reader(METADATA.as_bytes(), origin()).unwrap();
    let result = Mapping::builder()
        .metadata(table)
        .site_labels_from_reader("site\tid_pattern\nA\tB\n".as_bytes(), Utf8Path::new("sites.tsv"));
    assert_matches!(result, Err(SampleError::InvalidSiteTable { .. }));
}

#[test]
fn missing_metadata_file_is_fatal() {
    assert_matches!(
        Mapping::load(Utf8Path::new("/nonexistent/metadata.tsv"), None),
        Err(SampleError::MissingInput(_))
    );
}

#[test]
fn unusable_site_labels_are_reported() {
    let table = MetadataTable::from_reader(METADATA.as_bytes(), origin()).unwrap();
    let sites = "id_pattern\tsiteId\t \tCounty\nS*\tSiteB\tx\t..\nS*\tSiteB\t\tSouth\n";
    let mapping = Mapping::builder()
        .metadata(table)
        .site_labels_from_reader(sites.as_bytes(), Utf8Path::new("sites.tsv"))
        .unwrap()
        .build();

    let labels = mapping.labels("SiteB").unwrap();
    assert!(labels.iter().all(Label::is_path_safe));
    assert!(labels.contains(&Label::new("County", "South")));
    assert!(!labels.iter().any(|label| label.label == "x"));

    let rejected: Vec<&NoticeKind> = mapping
        .notices()
        .iter()
        .map(|notice| &notice.kind)
        .filter(|kind| matches!(kind, NoticeKind::InvalidLabel { .. }))
        .collect();
    assert_eq!(
        rejected,
        [
            &NoticeKind::InvalidLabel {
                group: String::new(),
                label: "x".to_string(),
            },
            &NoticeKind::InvalidLabel {
                group: "County".to_string(),
                label: "..".to_string(),
            },
        ]
    );
}
