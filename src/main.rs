use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::collections::HashSet;
use std::path::PathBuf;

use vderep::ani::PruneParams;
use vderep::blast_exec::{self, BlastnParams};
use vderep::checkv::{self, CheckvFilter, QualityTier};
use vderep::cluster::ClusterParams;
use vderep::derep::{dereplicate_sequences, DerepParams};
use vderep::fasta;

/// vderep - dereplicate viral contigs by ANI-based greedy clustering
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dereplicate contigs: all-vs-all BLASTN, ANI clustering, one
    /// representative (the longest) per cluster
    Derep(DerepArgs),

    /// Filter contigs by CheckV quality metrics
    Filter(FilterArgs),
}

#[derive(Args, Debug)]
struct DerepArgs {
    /// Input FASTA file with contigs to dereplicate
    #[clap(short, long)]
    input: PathBuf,

    /// Output FASTA file with representative contigs
    #[clap(short, long, default_value = "dereplicated.fasta")]
    output: PathBuf,

    /// Number of threads for BLASTN
    #[clap(short, long, default_value = "2")]
    threads: usize,

    /// Directory for intermediate files (default: the system temp dir)
    #[clap(long)]
    tmp: Option<PathBuf>,

    /// Keep the intermediate directory after completion
    #[clap(long)]
    keep_tmp: bool,

    /// Minimum ANI to consider two contigs the same (0-100)
    #[clap(long, default_value = "95.0")]
    min_ani: f64,

    /// Minimum query coverage (0-100)
    #[clap(long, default_value = "0.0")]
    min_qcov: f64,

    /// Minimum target coverage (0-100)
    #[clap(long, default_value = "85.0")]
    min_tcov: f64,

    /// Minimum contig length to participate in clustering
    #[clap(long, default_value = "1")]
    min_length: u64,

    /// Minimum alignment length to count a BLAST hit
    #[clap(long, default_value = "0")]
    min_aln_length: u64,

    /// Maximum e-value to count a BLAST hit
    #[clap(long, default_value = "1e-3")]
    max_evalue: f64,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// CheckV quality_summary.tsv file
    #[clap(short, long)]
    checkv: PathBuf,

    /// Input FASTA file with the contigs CheckV was run on
    #[clap(short, long)]
    input: PathBuf,

    /// Output FASTA file with passing contigs
    #[clap(short, long, default_value = "filtered.fasta")]
    output: PathBuf,

    /// Minimum contig length (0 = no minimum)
    #[clap(long, default_value = "0")]
    min_len: u64,

    /// Maximum contig length (0 = no maximum)
    #[clap(long, default_value = "0")]
    max_len: u64,

    /// Only keep proviruses
    #[clap(long)]
    provirus_only: bool,

    /// Minimum completeness percentage
    #[clap(long)]
    min_completeness: Option<f64>,

    /// Maximum contamination percentage
    #[clap(long)]
    max_contam: Option<f64>,

    /// Only keep contigs with no CheckV warnings
    #[clap(long)]
    no_warnings: bool,

    /// Exclude contigs with quality "Not-determined"
    #[clap(long)]
    exclude_undetermined: bool,

    /// Only keep contigs with quality "Complete"
    #[clap(long)]
    complete_only: bool,

    /// Minimum quality tier: low, medium, or high
    #[clap(long, default_value = "low")]
    min_quality: String,
}

fn validate_percentage(value: f64, name: &str) -> Result<()> {
    if !(0.0..=100.0).contains(&value) {
        anyhow::bail!("{name} must be between 0 and 100, got {value}");
    }
    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap(),
    );
    pb.set_message(message);
    pb
}

fn run_derep(args: &DerepArgs) -> Result<()> {
    validate_percentage(args.min_ani, "--min-ani")?;
    validate_percentage(args.min_qcov, "--min-qcov")?;
    validate_percentage(args.min_tcov, "--min-tcov")?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("vderep_");
    let workdir = match &args.tmp {
        Some(base) => builder.tempdir_in(base),
        None => builder.tempdir(),
    }
    .context("failed to create intermediate directory")?;
    info!("intermediate directory: {}", workdir.path().display());

    let db_prefix = workdir.path().join("db");
    let blast_out = workdir.path().join("blast.tsv");
    let ani_out = workdir.path().join("ani.tsv");

    blast_exec::run_makeblastdb(&args.input, &db_prefix)?;

    let pb = spinner("Running all-vs-all BLASTN...");
    blast_exec::run_blastn(
        args.input.as_path(),
        db_prefix.as_path(),
        blast_out.as_path(),
        &BlastnParams {
            threads: args.threads,
            evalue: args.max_evalue,
            ..Default::default()
        },
    )?;
    pb.finish_with_message("BLASTN complete");

    let params = DerepParams {
        prune: PruneParams {
            min_length: args.min_aln_length,
            max_evalue: args.max_evalue,
        },
        cluster: ClusterParams {
            min_ani: args.min_ani,
            min_qcov: args.min_qcov,
            min_tcov: args.min_tcov,
        },
        min_length: args.min_length,
    };

    let representatives =
        dereplicate_sequences(&args.input, &blast_out, &ani_out, &params)?;

    let written = fasta::filter_sequences(&args.input, &representatives, &args.output, false)?;
    info!(
        "wrote {written} representative contigs to {}",
        args.output.display()
    );

    if args.keep_tmp {
        let kept = workdir.into_path();
        info!("intermediate files kept in {}", kept.display());
    }

    Ok(())
}

fn run_filter(args: &FilterArgs) -> Result<()> {
    let filter = CheckvFilter {
        min_len: args.min_len,
        max_len: args.max_len,
        provirus_only: args.provirus_only,
        min_completeness: args.min_completeness,
        max_contamination: args.max_contam,
        no_warnings: args.no_warnings,
        exclude_undetermined: args.exclude_undetermined,
        complete_only: args.complete_only,
        min_quality: QualityTier::from_threshold(&args.min_quality)?,
    };

    let keep: HashSet<String> = checkv::filter_quality_summary(&args.checkv, &filter)?;
    let written = fasta::filter_sequences(&args.input, &keep, &args.output, false)?;
    info!(
        "wrote {written} passing contigs to {}",
        args.output.display()
    );

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("arguments: {cli:?}");

    match &cli.command {
        Command::Derep(args) => run_derep(args),
        Command::Filter(args) => run_filter(args),
    }
}
