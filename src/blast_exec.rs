//! Invocation of the external BLAST+ toolchain.
//!
//! The all-vs-all comparison itself is delegated to `makeblastdb` and
//! `blastn`; this module owns binary discovery and process handling, nothing
//! more. The `-outfmt "6 std qlen slen"` layout produced here is the 14-field
//! contract the parser in `blast` expects.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment override for the blastn location.
pub const BLASTN_PATH_ENV: &str = "VDEREP_BLASTN_PATH";

/// Options forwarded to blastn.
#[derive(Debug, Clone, Copy)]
pub struct BlastnParams {
    pub threads: usize,
    pub max_target_seqs: u32,
    pub evalue: f64,
}

impl Default for BlastnParams {
    fn default() -> Self {
        BlastnParams {
            threads: 2,
            max_target_seqs: 10_000,
            evalue: 1e-3,
        }
    }
}

/// Locate blastn: the env override first, then a PATH probe.
pub fn find_blastn() -> Result<PathBuf> {
    if let Ok(custom) = env::var(BLASTN_PATH_ENV) {
        let path = PathBuf::from(&custom);
        if path.is_file() {
            return Ok(path);
        }
        bail!("blastn not found at {BLASTN_PATH_ENV}={custom}");
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join("blastn");
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    bail!(
        "blastn not found in PATH. Install the BLAST+ toolkit \
         (e.g. `conda install -c bioconda blast`) or set {BLASTN_PATH_ENV}"
    )
}

fn run_checked(mut cmd: Command, tool: &str) -> Result<()> {
    debug!("running: {cmd:?}");
    let output = cmd
        .output()
        .with_context(|| format!("failed to launch {tool}"))?;

    if !output.status.success() {
        bail!(
            "{tool} failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    if !output.stdout.is_empty() {
        debug!("{tool}: {}", String::from_utf8_lossy(&output.stdout).trim());
    }
    Ok(())
}

/// Build a nucleotide BLAST database from a FASTA file.
pub fn run_makeblastdb<P: AsRef<Path>, Q: AsRef<Path>>(input: P, db_prefix: Q) -> Result<()> {
    info!(
        "creating BLAST database: {}",
        db_prefix.as_ref().display()
    );

    let mut cmd = Command::new("makeblastdb");
    cmd.arg("-in")
        .arg(input.as_ref())
        .arg("-dbtype")
        .arg("nucl")
        .arg("-out")
        .arg(db_prefix.as_ref());

    run_checked(cmd, "makeblastdb")
}

/// Run blastn all-vs-all, writing the 14-column tabular output to `out`.
pub fn run_blastn<P: AsRef<Path>>(
    query: P,
    db_prefix: P,
    out: P,
    params: &BlastnParams,
) -> Result<()> {
    let blastn = find_blastn()?;
    info!("running blastn with {} threads", params.threads);

    let mut cmd = Command::new(blastn);
    cmd.arg("-query")
        .arg(query.as_ref())
        .arg("-db")
        .arg(db_prefix.as_ref())
        .arg("-out")
        .arg(out.as_ref())
        .arg("-outfmt")
        .arg("6 std qlen slen")
        .arg("-max_target_seqs")
        .arg(params.max_target_seqs.to_string())
        .arg("-num_threads")
        .arg(params.threads.to_string())
        .arg("-evalue")
        .arg(params.evalue.to_string());

    run_checked(cmd, "blastn")?;
    info!("blastn results written to {}", out.as_ref().display());
    Ok(())
}
