// File-level tests for the CheckV quality filter wired to FASTA output.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use vderep::checkv::{filter_quality_summary, CheckvFilter, QualityTier};
use vderep::error::DerepError;
use vderep::fasta;

fn write_quality_summary(dir: &Path) -> PathBuf {
    let path = dir.join("quality_summary.tsv");
    let table = "\
contig_id\tcontig_length\tprovirus\tcompleteness\tcontamination\tcheckv_quality\twarnings
phage_1\t42000\tNo\t100.0\t0.0\tComplete\t
phage_2\t18000\tNo\t71.4\t1.2\tMedium-quality\t
phage_3\t2100\tNo\t12.0\t0.0\tLow-quality\t
phage_4\t35000\tYes\t96.0\tNA\tHigh-quality\tcontig >1.5x longer than expected genome length
phage_5\t900\tNo\tNA\tNA\tNot-determined\t
";
    fs::write(&path, table).unwrap();
    path
}

fn write_contigs(dir: &Path) -> PathBuf {
    let path = dir.join("contigs.fasta");
    let mut text = String::new();
    for name in ["phage_1", "phage_2", "phage_3", "phage_4", "phage_5"] {
        text.push_str(&format!(">{name} assembled\nACGTACGT\n"));
    }
    fs::write(&path, text).unwrap();
    path
}

fn ids(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn default_filter_keeps_everything_determined() {
    let dir = TempDir::new().unwrap();
    let summary = write_quality_summary(dir.path());

    let keep = filter_quality_summary(&summary, &CheckvFilter::default()).unwrap();
    assert_eq!(keep, ids(&["phage_1", "phage_2", "phage_3", "phage_4"]));
}

#[test]
fn combined_predicates_narrow_the_set() {
    let dir = TempDir::new().unwrap();
    let summary = write_quality_summary(dir.path());

    let filter = CheckvFilter {
        min_len: 5_000,
        min_completeness: Some(90.0),
        min_quality: QualityTier::High,
        ..Default::default()
    };
    let keep = filter_quality_summary(&summary, &filter).unwrap();
    assert_eq!(keep, ids(&["phage_1", "phage_4"]));

    let no_warnings = CheckvFilter {
        no_warnings: true,
        ..filter
    };
    let keep = filter_quality_summary(&summary, &no_warnings).unwrap();
    assert_eq!(keep, ids(&["phage_1"]));
}

#[test]
fn filtered_fasta_preserves_input_order() {
    let dir = TempDir::new().unwrap();
    let summary = write_quality_summary(dir.path());
    let contigs = write_contigs(dir.path());

    let filter = CheckvFilter {
        min_quality: QualityTier::Medium,
        ..Default::default()
    };
    let keep = filter_quality_summary(&summary, &filter).unwrap();

    let out = dir.path().join("filtered.fasta");
    let written = fasta::filter_sequences(&contigs, &keep, &out, false).unwrap();
    assert_eq!(written, 3);

    let text = fs::read_to_string(&out).unwrap();
    let headers: Vec<&str> = text.lines().filter(|l| l.starts_with('>')).collect();
    assert_eq!(headers, [">phage_1", ">phage_2", ">phage_4"]);
}

#[test]
fn headerless_empty_file_is_empty_input() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quality_summary.tsv");
    fs::write(&path, "").unwrap();

    let err = filter_quality_summary(&path, &CheckvFilter::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DerepError>(),
        Some(DerepError::EmptyInput(_))
    ));
}

#[test]
fn missing_required_column_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quality_summary.tsv");
    fs::write(&path, "contig_id\tcontig_length\nphage_1\t42000\n").unwrap();

    let err = filter_quality_summary(&path, &CheckvFilter::default()).unwrap_err();
    assert!(err.to_string().contains("provirus"));
}
