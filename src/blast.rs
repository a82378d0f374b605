//! BLAST tabular output parsing and per-pair block iteration.
//!
//! The raw table is BLASTN `-outfmt "6 std qlen slen"`: 14 tab-separated
//! fields per hit, no header, all hits for a (query, target) pair emitted
//! contiguously. That ordering is a contract with the aligner and is not
//! re-validated here.

use crate::error::DerepError;
use anyhow::Result;
use std::io::BufRead;

/// One BLASTN hit.
///
/// Coordinates are 1-based inclusive and normalized so `start <= stop`
/// regardless of strand. Sequence lengths and the aligner-reported alignment
/// length are kept as floats so downstream weighted sums and the fractional
/// coverage bound stay in float space.
#[derive(Debug, Clone, PartialEq)]
pub struct BlastRecord {
    pub qname: String,
    pub tname: String,
    pub pid: f64,
    pub length: f64,
    pub qcoords: (u64, u64),
    pub tcoords: (u64, u64),
    pub qlen: f64,
    pub tlen: f64,
    pub evalue: f64,
}

impl BlastRecord {
    /// Bases this hit spans on the query.
    pub fn query_span(&self) -> u64 {
        self.qcoords.1 - self.qcoords.0 + 1
    }
}

fn malformed(line_no: u64, reason: String) -> DerepError {
    DerepError::MalformedRecord {
        line: line_no,
        reason,
    }
}

/// Parse one raw alignment line.
///
/// Field order: qseqid sseqid pident length mismatch gapopen qstart qend
/// sstart send evalue bitscore qlen slen. Fewer than 14 fields or an
/// unparsable numeric field is fatal for the whole run.
pub fn parse_blast_line(line: &str, line_no: u64) -> Result<BlastRecord, DerepError> {
    let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();

    if fields.len() < 14 {
        return Err(malformed(
            line_no,
            format!("expected 14 fields, found {}", fields.len()),
        ));
    }

    let float = |idx: usize, name: &str| -> Result<f64, DerepError> {
        fields[idx]
            .parse()
            .map_err(|_| malformed(line_no, format!("invalid {name}: {:?}", fields[idx])))
    };
    let coord = |idx: usize, name: &str| -> Result<u64, DerepError> {
        fields[idx]
            .parse()
            .map_err(|_| malformed(line_no, format!("invalid {name}: {:?}", fields[idx])))
    };

    // Coordinates arrive start > stop on the reverse strand; normalize
    let span = |start: u64, stop: u64| (start.min(stop), start.max(stop));

    Ok(BlastRecord {
        qname: fields[0].to_string(),
        tname: fields[1].to_string(),
        pid: float(2, "percent identity")?,
        length: float(3, "alignment length")?,
        qcoords: span(coord(6, "query start")?, coord(7, "query stop")?),
        tcoords: span(coord(8, "target start")?, coord(9, "target stop")?),
        evalue: float(10, "e-value")?,
        qlen: float(12, "query length")?,
        tlen: float(13, "target length")?,
    })
}

/// Iterator over blocks of consecutive records sharing one (query, target)
/// pair.
///
/// Single forward pass with O(1) look-back; never sorts. If the upstream
/// ordering contract is violated, a pair's records split into separate blocks
/// silently. Not restartable without re-opening the source.
pub struct PairBlocks<R: BufRead> {
    reader: R,
    line_no: u64,
    pending: Option<BlastRecord>,
    done: bool,
}

impl<R: BufRead> PairBlocks<R> {
    pub fn new(reader: R) -> Self {
        PairBlocks {
            reader,
            line_no: 0,
            pending: None,
            done: false,
        }
    }

    fn read_record(&mut self) -> Option<Result<BlastRecord>> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                Some(parse_blast_line(&line, self.line_no).map_err(Into::into))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

impl<R: BufRead> Iterator for PairBlocks<R> {
    type Item = Result<Vec<BlastRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let first = match self.pending.take() {
            Some(record) => record,
            None => match self.read_record()? {
                Ok(record) => record,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            },
        };

        let mut block = vec![first];
        loop {
            match self.read_record() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(record)) => {
                    if record.qname == block[0].qname && record.tname == block[0].tname {
                        block.push(record);
                    } else {
                        self.pending = Some(record);
                        break;
                    }
                }
            }
        }

        Some(Ok(block))
    }
}
