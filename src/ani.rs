//! Per-pair reduction of raw alignments into identity/coverage summaries.
//!
//! Blocks from the raw BLAST table are pruned, reduced to one
//! (identity, query coverage, target coverage) row per pair, and streamed to
//! the summary artifact that the clustering stage consumes. One sequential
//! pass, O(one block) memory.

use crate::blast::{BlastRecord, PairBlocks};
use crate::error::DerepError;
use crate::table_io::{open_reader, Sink};
use anyhow::Result;
use log::info;
use std::io::Write;
use std::path::Path;

/// Kept alignment length may overshoot one query length by this factor
/// before the block is truncated. Keeps a single highly-repetitive pair from
/// dominating the identity calculation.
const COVERAGE_OVERSHOOT: f64 = 1.10;

/// Header of the summary artifact.
pub const SUMMARY_HEADER: &str = "qname\ttname\tnum_alns\tpid\tqcov\ttcov";

/// Thresholds for discarding raw alignments before reduction.
#[derive(Debug, Clone, Copy)]
pub struct PruneParams {
    /// Minimum query-span length of a hit, in bases.
    pub min_length: u64,
    /// Maximum e-value of a hit.
    pub max_evalue: f64,
}

impl Default for PruneParams {
    fn default() -> Self {
        PruneParams {
            min_length: 0,
            max_evalue: 1e-3,
        }
    }
}

/// Discard low-quality hits and truncate once query coverage saturates.
///
/// Records are walked in aligner output order (descending score). A hit
/// failing the length or e-value threshold is skipped without affecting the
/// running total; once the kept total reaches the query length, or would pass
/// 110% of it, the rest of the block is dropped outright.
pub fn prune_alignments(alns: &[BlastRecord], params: PruneParams) -> Vec<BlastRecord> {
    let Some(first) = alns.first() else {
        return Vec::new();
    };
    let qlen = first.qlen;

    let mut keep = Vec::new();
    let mut covered = 0.0f64;

    for aln in alns {
        let span = aln.query_span() as f64;

        if aln.query_span() < params.min_length || aln.evalue > params.max_evalue {
            continue;
        }

        if covered >= qlen || covered + span >= COVERAGE_OVERSHOOT * qlen {
            break;
        }

        keep.push(aln.clone());
        covered += span;
    }

    keep
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Alignment-length-weighted mean percent identity, rounded to 2 decimals.
///
/// Weighted by the aligner-reported alignment length (which may exceed the
/// ungapped query span). Returns 0.0 for an empty block rather than dividing
/// by zero; production callers skip empty blocks before this point.
pub fn compute_ani(alns: &[BlastRecord]) -> f64 {
    let total: f64 = alns.iter().map(|a| a.length).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = alns.iter().map(|a| a.length * a.pid).sum();
    round2(weighted / total)
}

/// Total bases covered by a set of 1-based inclusive spans, counting
/// overlapping or bookended spans once. Spans within one base of each other
/// (`start <= prev_stop + 1`) merge.
fn merged_span_total(mut spans: Vec<(u64, u64)>) -> u64 {
    spans.sort_unstable();

    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(spans.len());
    for (start, stop) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(stop),
            _ => merged.push((start, stop)),
        }
    }

    merged.iter().map(|(start, stop)| stop - start + 1).sum()
}

/// Fraction of the query and target spanned by merged alignments, as
/// percentages rounded to 2 decimals. Query and target merges are
/// independent.
pub fn compute_coverage(alns: &[BlastRecord]) -> (f64, f64) {
    let qbases = merged_span_total(alns.iter().map(|a| a.qcoords).collect());
    let tbases = merged_span_total(alns.iter().map(|a| a.tcoords).collect());

    let qcov = round2(100.0 * qbases as f64 / alns[0].qlen);
    let tcov = round2(100.0 * tbases as f64 / alns[0].tlen);
    (qcov, tcov)
}

/// One row of the summary artifact: a pruned block reduced to three numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct PairSummary {
    pub qname: String,
    pub tname: String,
    pub num_alns: usize,
    pub pid: f64,
    pub qcov: f64,
    pub tcov: f64,
}

impl PairSummary {
    /// Reduce a non-empty pruned block.
    pub fn from_block(alns: &[BlastRecord]) -> Self {
        let (qcov, tcov) = compute_coverage(alns);
        PairSummary {
            qname: alns[0].qname.clone(),
            tname: alns[0].tname.clone(),
            num_alns: alns.len(),
            pid: compute_ani(alns),
            qcov,
            tcov,
        }
    }
}

/// Parse one data row of the summary artifact.
pub fn parse_summary_row(line: &str, line_no: u64) -> Result<PairSummary, DerepError> {
    let malformed = |reason: String| DerepError::MalformedSummaryRow {
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
    if fields.len() < 6 {
        return Err(malformed(format!(
            "expected 6 fields, found {}",
            fields.len()
        )));
    }

    let number = |idx: usize, name: &str| -> Result<f64, DerepError> {
        fields[idx]
            .parse()
            .map_err(|_| malformed(format!("invalid {name}: {:?}", fields[idx])))
    };

    Ok(PairSummary {
        qname: fields[0].to_string(),
        tname: fields[1].to_string(),
        num_alns: fields[2]
            .parse()
            .map_err(|_| malformed(format!("invalid num_alns: {:?}", fields[2])))?,
        pid: number(3, "pid")?,
        qcov: number(4, "qcov")?,
        tcov: number(5, "tcov")?,
    })
}

/// Stream the raw BLAST table into the summary artifact.
///
/// Writes the header plus one row per pair with surviving alignments after
/// pruning; pairs pruned to nothing produce no row. Self-pairs are written
/// like any other pair — excluding them is the clustering stage's job. A
/// `.gz` suffix on `out_path` gzips the artifact. A table with zero records
/// is an `EmptyInput` error.
pub fn calculate_ani<P: AsRef<Path>, Q: AsRef<Path>>(
    blast_path: P,
    out_path: Q,
    params: PruneParams,
) -> Result<u64> {
    info!("calculating ANI from {}", blast_path.as_ref().display());

    let reader = open_reader(&blast_path)?;
    let mut sink = Sink::create(&out_path)?;
    writeln!(sink, "{SUMMARY_HEADER}")?;

    let mut records = 0u64;
    let mut pairs = 0u64;

    for block in PairBlocks::new(reader) {
        let block = block?;
        records += block.len() as u64;

        let kept = prune_alignments(&block, params);
        if kept.is_empty() {
            continue;
        }

        let summary = PairSummary::from_block(&kept);
        writeln!(
            sink,
            "{}\t{}\t{}\t{:.2}\t{:.2}\t{:.2}",
            summary.qname,
            summary.tname,
            summary.num_alns,
            summary.pid,
            summary.qcov,
            summary.tcov
        )?;
        pairs += 1;
    }

    if records == 0 {
        return Err(DerepError::EmptyInput(format!(
            "no alignment records in {}",
            blast_path.as_ref().display()
        ))
        .into());
    }

    sink.finish()?;
    info!("summarized {pairs} sequence pairs");
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(qcoords: (u64, u64), length: f64, pid: f64, evalue: f64) -> BlastRecord {
        BlastRecord {
            qname: "q".to_string(),
            tname: "t".to_string(),
            pid,
            length,
            qcoords,
            tcoords: qcoords,
            qlen: 1000.0,
            tlen: 1200.0,
            evalue,
        }
    }

    #[test]
    fn ani_is_length_weighted() {
        let alns = vec![
            record((1, 100), 100.0, 95.0, 1e-10),
            record((201, 250), 50.0, 90.0, 1e-10),
        ];
        assert_eq!(compute_ani(&alns), 93.33);
    }

    #[test]
    fn ani_of_empty_block_is_zero() {
        assert_eq!(compute_ani(&[]), 0.0);
    }

    #[test]
    fn coverage_counts_disjoint_spans_separately() {
        let alns = vec![
            record((1, 100), 100.0, 95.0, 1e-10),
            record((201, 300), 100.0, 95.0, 1e-10),
        ];
        let (qcov, tcov) = compute_coverage(&alns);
        assert_eq!(qcov, 20.0);
        assert_eq!(tcov, round2(200.0 / 1200.0 * 100.0));
    }

    #[test]
    fn coverage_merges_overlapping_spans() {
        let alns = vec![
            record((1, 100), 100.0, 95.0, 1e-10),
            record((50, 150), 101.0, 95.0, 1e-10),
        ];
        let (qcov, _) = compute_coverage(&alns);
        // [1,100] and [50,150] merge to [1,150]: 150 bases, not 200
        assert_eq!(qcov, 15.0);
    }

    #[test]
    fn coverage_merges_bookended_spans() {
        // stop 100 and start 101 are within one base, so they merge
        assert_eq!(merged_span_total(vec![(1, 100), (101, 200)]), 200);
        // a gap of one base keeps the spans separate
        assert_eq!(merged_span_total(vec![(1, 100), (102, 200)]), 199);
    }

    #[test]
    fn prune_truncates_at_coverage_overshoot() {
        // Spans of 600 + 500 = 1100 >= 1.10 * 1000, so the second record
        // triggers the break and the third is never examined.
        let alns = vec![
            record((1, 600), 600.0, 99.0, 1e-10),
            record((1, 500), 500.0, 99.0, 1e-10),
            record((1, 100), 100.0, 99.9, 1e-50),
        ];
        let kept = prune_alignments(&alns, PruneParams::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].qcoords, (1, 600));
    }

    #[test]
    fn prune_stops_once_query_is_covered() {
        let alns = vec![
            record((1, 1000), 1000.0, 99.0, 1e-10),
            record((1, 50), 50.0, 99.0, 1e-10),
        ];
        let kept = prune_alignments(&alns, PruneParams::default());
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn prune_skips_short_hits_without_terminating() {
        let alns = vec![
            record((1, 100), 100.0, 95.0, 1e-10),
            record((201, 210), 10.0, 95.0, 1e-10),
            record((301, 400), 100.0, 95.0, 1e-10),
        ];
        let kept = prune_alignments(
            &alns,
            PruneParams {
                min_length: 50,
                ..Default::default()
            },
        );
        // the 10 bp hit is dropped, not counted, and the scan continues
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].qcoords, (301, 400));
    }

    #[test]
    fn prune_skips_weak_evalues_without_terminating() {
        let alns = vec![
            record((1, 100), 100.0, 95.0, 1e-10),
            record((201, 300), 100.0, 95.0, 1e-1),
            record((401, 500), 100.0, 95.0, 1e-10),
        ];
        let kept = prune_alignments(&alns, PruneParams::default());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].qcoords, (401, 500));
    }

    #[test]
    fn summary_from_block() {
        let alns = vec![
            record((1, 100), 100.0, 95.0, 1e-10),
            record((201, 250), 50.0, 90.0, 1e-10),
        ];
        let summary = PairSummary::from_block(&alns);
        assert_eq!(summary.num_alns, 2);
        assert_eq!(summary.pid, 93.33);
        assert_eq!(summary.qcov, 15.0);
    }

    #[test]
    fn summary_row_roundtrip() {
        let row = parse_summary_row("a\tb\t2\t93.33\t15.00\t12.50", 2).unwrap();
        assert_eq!(row.qname, "a");
        assert_eq!(row.tname, "b");
        assert_eq!(row.num_alns, 2);
        assert_eq!(row.pid, 93.33);
        assert_eq!(row.qcov, 15.0);
        assert_eq!(row.tcov, 12.5);
    }

    #[test]
    fn summary_row_rejects_bad_numeric() {
        let err = parse_summary_row("a\tb\t2\thigh\t15.00\t12.50", 9).unwrap_err();
        match err {
            DerepError::MalformedSummaryRow { line, .. } => assert_eq!(line, 9),
            other => panic!("unexpected error: {other}"),
        }
    }
}
