//! FASTA boundary: length catalogs in, id-filtered records out.
//!
//! The core only needs per-sequence identifiers and lengths on the way in,
//! and an id-filtered copy of the source on the way out. Ids are truncated
//! at the first whitespace to match what BLAST reports.

use crate::table_io::Sink;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use needletail::parse_fastx_file;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

const FASTA_LINE_WIDTH: usize = 80;

fn record_id(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Read per-sequence lengths, in file order. Handles gzipped input.
pub fn sequence_lengths<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, u64>> {
    let path = path.as_ref();
    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("failed to open FASTA file {}", path.display()))?;

    let mut lengths = IndexMap::new();
    while let Some(record) = reader.next() {
        let record = record?;
        lengths.insert(record_id(record.id()), record.seq().len() as u64);
    }

    Ok(lengths)
}

/// Stream the source FASTA and emit records whose id is in `ids` (or, with
/// `exclude`, records whose id is not). Original record order is preserved;
/// sequences are rewrapped at 80 columns. A `.gz` suffix on `out_path`
/// gzips the output. Returns the number of records written.
pub fn filter_sequences<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    ids: &HashSet<String>,
    out_path: Q,
    exclude: bool,
) -> Result<usize> {
    let path = path.as_ref();
    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("failed to open FASTA file {}", path.display()))?;
    let mut sink = Sink::create(&out_path)?;

    let mut written = 0;
    while let Some(record) = reader.next() {
        let record = record?;
        let id = record_id(record.id());

        if ids.contains(&id) == exclude {
            continue;
        }

        writeln!(sink, ">{id}")?;
        for chunk in record.seq().chunks(FASTA_LINE_WIDTH) {
            sink.write_all(chunk)?;
            sink.write_all(b"\n")?;
        }
        written += 1;
    }

    sink.finish()?;
    Ok(written)
}
