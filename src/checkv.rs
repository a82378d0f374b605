//! Filtering contigs by CheckV quality metrics.
//!
//! A CheckV `quality_summary.tsv` is a header-addressed tab table, one row
//! per contig. Each predicate is applied row-by-row; a contig passes only if
//! it clears every enabled filter. Missing values appear as "NA" or empty
//! fields.

use crate::error::DerepError;
use crate::table_io::open_reader;
use anyhow::{bail, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// CheckV's five-tier quality ladder, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityTier {
    NotDetermined,
    Low,
    Medium,
    High,
    Complete,
}

impl QualityTier {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "Complete" => Some(QualityTier::Complete),
            "High-quality" => Some(QualityTier::High),
            "Medium-quality" => Some(QualityTier::Medium),
            "Low-quality" => Some(QualityTier::Low),
            "Not-determined" => Some(QualityTier::NotDetermined),
            _ => None,
        }
    }

    /// Parse a user-facing threshold name (`low`, `medium`, `high`).
    pub fn from_threshold(name: &str) -> Result<Self> {
        match name {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            _ => bail!("invalid quality threshold {name:?}; must be one of: low, medium, high"),
        }
    }
}

/// Row predicates. All length/percentage filters treat 0/None as disabled.
#[derive(Debug, Clone)]
pub struct CheckvFilter {
    pub min_len: u64,
    pub max_len: u64,
    pub provirus_only: bool,
    pub min_completeness: Option<f64>,
    pub max_contamination: Option<f64>,
    pub no_warnings: bool,
    pub exclude_undetermined: bool,
    pub complete_only: bool,
    pub min_quality: QualityTier,
}

impl Default for CheckvFilter {
    fn default() -> Self {
        CheckvFilter {
            min_len: 0,
            max_len: 0,
            provirus_only: false,
            min_completeness: None,
            max_contamination: None,
            no_warnings: false,
            exclude_undetermined: false,
            complete_only: false,
            min_quality: QualityTier::Low,
        }
    }
}

struct CheckvRow {
    contig_id: String,
    contig_length: u64,
    provirus: bool,
    completeness: Option<f64>,
    contamination: Option<f64>,
    quality: Option<QualityTier>,
    warnings: Option<String>,
}

fn optional(field: &str) -> Option<&str> {
    match field {
        "" | "NA" => None,
        other => Some(other),
    }
}

struct ColumnIndex(HashMap<String, usize>);

impl ColumnIndex {
    fn from_header(header: &str) -> Self {
        ColumnIndex(
            header
                .trim_end_matches(['\n', '\r'])
                .split('\t')
                .enumerate()
                .map(|(i, name)| (name.to_string(), i))
                .collect(),
        )
    }

    fn get<'a>(&self, fields: &[&'a str], name: &str) -> Result<&'a str> {
        let index = *self
            .0
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("CheckV file is missing the {name:?} column"))?;
        fields
            .get(index)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("row is missing the {name:?} column"))
    }
}

fn parse_row(columns: &ColumnIndex, line: &str, line_no: u64) -> Result<CheckvRow> {
    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();

    let number = |name: &str| -> Result<Option<f64>> {
        match optional(columns.get(&fields, name)?) {
            None => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|_| {
                anyhow::anyhow!("invalid {name} at line {line_no}: {text:?}")
            }),
        }
    };

    Ok(CheckvRow {
        contig_id: columns.get(&fields, "contig_id")?.to_string(),
        contig_length: columns
            .get(&fields, "contig_length")?
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid contig_length at line {line_no}"))?,
        provirus: columns.get(&fields, "provirus")? == "Yes",
        completeness: number("completeness")?,
        contamination: number("contamination")?,
        quality: optional(columns.get(&fields, "checkv_quality")?)
            .and_then(QualityTier::from_label),
        warnings: optional(columns.get(&fields, "warnings")?).map(str::to_string),
    })
}

fn passes(row: &CheckvRow, filter: &CheckvFilter) -> bool {
    if filter.min_len > 0 && row.contig_length < filter.min_len {
        return false;
    }
    if filter.max_len > 0 && row.contig_length > filter.max_len {
        return false;
    }
    if filter.provirus_only && !row.provirus {
        return false;
    }
    // Unknown completeness fails the threshold; unknown contamination passes
    if let Some(min) = filter.min_completeness {
        match row.completeness {
            Some(value) if value >= min => {}
            _ => return false,
        }
    }
    if let Some(max) = filter.max_contamination {
        if matches!(row.contamination, Some(value) if value > max) {
            return false;
        }
    }
    if filter.no_warnings && row.warnings.is_some() {
        return false;
    }

    if filter.complete_only {
        return row.quality == Some(QualityTier::Complete);
    }
    match row.quality {
        Some(tier) if tier >= filter.min_quality => {
            !(filter.exclude_undetermined && tier == QualityTier::NotDetermined)
        }
        _ => false,
    }
}

/// Ids of contigs passing every enabled predicate.
pub fn filter_quality_summary<P: AsRef<Path>>(
    path: P,
    filter: &CheckvFilter,
) -> Result<HashSet<String>> {
    info!("loading CheckV results from {}", path.as_ref().display());
    let mut reader = open_reader(&path)?;

    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 {
        return Err(DerepError::EmptyInput(format!(
            "CheckV file {} is empty",
            path.as_ref().display()
        ))
        .into());
    }
    let columns = ColumnIndex::from_header(&header);

    let mut keep = HashSet::new();
    let mut total = 0u64;
    let mut line = String::new();
    let mut line_no = 1u64;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;
        total += 1;

        let row = parse_row(&columns, &line, line_no)?;
        if passes(&row, filter) {
            keep.insert(row.contig_id);
        }
    }

    if total == 0 {
        return Err(DerepError::EmptyInput(format!(
            "CheckV file {} has no data rows",
            path.as_ref().display()
        ))
        .into());
    }

    info!("filtering kept {} of {total} contigs", keep.len());
    debug!("filter settings: {filter:?}");
    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "contig_id\tcontig_length\tprovirus\tcompleteness\tcontamination\tcheckv_quality\twarnings";

    fn row(
        id: &str,
        length: u64,
        provirus: &str,
        completeness: &str,
        contamination: &str,
        quality: &str,
        warnings: &str,
    ) -> String {
        format!("{id}\t{length}\t{provirus}\t{completeness}\t{contamination}\t{quality}\t{warnings}")
    }

    fn run(rows: &[String], filter: &CheckvFilter) -> HashSet<String> {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for r in rows {
            writeln!(file, "{r}").unwrap();
        }
        file.flush().unwrap();
        filter_quality_summary(file.path(), filter).unwrap()
    }

    #[test]
    fn tier_ordering_follows_the_ladder() {
        assert!(QualityTier::Complete > QualityTier::High);
        assert!(QualityTier::Low > QualityTier::NotDetermined);
        assert_eq!(
            QualityTier::from_threshold("medium").unwrap(),
            QualityTier::Medium
        );
        assert!(QualityTier::from_threshold("best").is_err());
    }

    #[test]
    fn default_filter_drops_not_determined() {
        let rows = vec![
            row("a", 5000, "No", "90.0", "0.0", "High-quality", ""),
            row("b", 5000, "No", "NA", "NA", "Not-determined", ""),
        ];
        let keep = run(&rows, &CheckvFilter::default());
        assert_eq!(keep, HashSet::from(["a".to_string()]));
    }

    #[test]
    fn length_bounds_are_inclusive() {
        let rows = vec![
            row("short", 999, "No", "90.0", "0.0", "Complete", ""),
            row("exact", 1000, "No", "90.0", "0.0", "Complete", ""),
            row("long", 50_001, "No", "90.0", "0.0", "Complete", ""),
        ];
        let filter = CheckvFilter {
            min_len: 1000,
            max_len: 50_000,
            ..Default::default()
        };
        let keep = run(&rows, &filter);
        assert_eq!(keep, HashSet::from(["exact".to_string()]));
    }

    #[test]
    fn missing_completeness_fails_min_completeness() {
        let rows = vec![
            row("a", 5000, "No", "NA", "0.0", "Low-quality", ""),
            row("b", 5000, "No", "80.0", "0.0", "Low-quality", ""),
        ];
        let filter = CheckvFilter {
            min_completeness: Some(50.0),
            ..Default::default()
        };
        let keep = run(&rows, &filter);
        assert_eq!(keep, HashSet::from(["b".to_string()]));
    }

    #[test]
    fn missing_contamination_passes_max_contamination() {
        let rows = vec![
            row("a", 5000, "No", "90.0", "NA", "High-quality", ""),
            row("b", 5000, "No", "90.0", "12.0", "High-quality", ""),
        ];
        let filter = CheckvFilter {
            max_contamination: Some(5.0),
            ..Default::default()
        };
        let keep = run(&rows, &filter);
        assert_eq!(keep, HashSet::from(["a".to_string()]));
    }

    #[test]
    fn quality_threshold_and_complete_only() {
        let rows = vec![
            row("low", 5000, "No", "30.0", "0.0", "Low-quality", ""),
            row("med", 5000, "No", "60.0", "0.0", "Medium-quality", ""),
            row("full", 5000, "No", "100.0", "0.0", "Complete", ""),
        ];

        let medium = CheckvFilter {
            min_quality: QualityTier::Medium,
            ..Default::default()
        };
        assert_eq!(
            run(&rows, &medium),
            HashSet::from(["med".to_string(), "full".to_string()])
        );

        let complete = CheckvFilter {
            complete_only: true,
            ..Default::default()
        };
        assert_eq!(run(&rows, &complete), HashSet::from(["full".to_string()]));
    }

    #[test]
    fn warnings_and_provirus_predicates() {
        let rows = vec![
            row("clean", 5000, "Yes", "90.0", "0.0", "High-quality", ""),
            row("warned", 5000, "Yes", "90.0", "0.0", "High-quality", "contig >1.5x longer"),
            row("host", 5000, "No", "90.0", "0.0", "High-quality", ""),
        ];
        let filter = CheckvFilter {
            provirus_only: true,
            no_warnings: true,
            ..Default::default()
        };
        assert_eq!(run(&rows, &filter), HashSet::from(["clean".to_string()]));
    }
}
