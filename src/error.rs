//! Typed failure taxonomy for the dereplication core.
//!
//! Library code surfaces `DerepError` for failures callers may need to
//! distinguish; CLI code stays on `anyhow::Result` for convenience.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DerepError {
    /// A raw alignment line failed to parse. Fatal: the table is
    /// aligner-generated, so one corrupt line means the whole file is suspect.
    #[error("malformed alignment record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// A row of the pairwise summary artifact failed to parse. The artifact
    /// is written by a trusted prior stage, so this is fatal too.
    #[error("malformed summary row at line {line}: {reason}")]
    MalformedSummaryRow { line: u64, reason: String },

    /// An input that must contain data had zero rows. An empty cluster set is
    /// almost always a misconfiguration, so this is surfaced rather than
    /// propagated as an empty result.
    #[error("empty input: {0}")]
    EmptyInput(String),
}
