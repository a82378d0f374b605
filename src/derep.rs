//! End-to-end dereplication: raw alignments in, representative ids out.

use crate::ani::{calculate_ani, PruneParams};
use crate::cluster::{cluster_by_ani, ClusterParams, Clustering, SequenceCatalog};
use crate::fasta;
use anyhow::Result;
use log::info;
use std::collections::HashSet;
use std::path::Path;

/// Full parameter set for a dereplication run.
#[derive(Debug, Clone, Copy)]
pub struct DerepParams {
    pub prune: PruneParams,
    pub cluster: ClusterParams,
    /// Minimum sequence length to participate in clustering.
    pub min_length: u64,
}

impl Default for DerepParams {
    fn default() -> Self {
        DerepParams {
            prune: PruneParams::default(),
            cluster: ClusterParams::default(),
            min_length: 1,
        }
    }
}

/// Reduce the raw alignment table to the summary artifact, cluster, and
/// return the centroid id set to keep.
///
/// The summary artifact at `ani_path` is left on disk for inspection or
/// reuse; it is the sole coupling between the calculation and clustering
/// stages.
pub fn dereplicate_sequences<P: AsRef<Path>>(
    fasta_path: P,
    blast_path: P,
    ani_path: P,
    params: &DerepParams,
) -> Result<HashSet<String>> {
    let clustering = cluster_sequences(fasta_path, blast_path, ani_path, params)?;
    Ok(clustering.centroid_set())
}

/// As `dereplicate_sequences`, but returning the full cluster assignment.
pub fn cluster_sequences<P: AsRef<Path>>(
    fasta_path: P,
    blast_path: P,
    ani_path: P,
    params: &DerepParams,
) -> Result<Clustering> {
    calculate_ani(&blast_path, &ani_path, params.prune)?;

    let lengths = fasta::sequence_lengths(&fasta_path)?;
    let catalog = SequenceCatalog::from_lengths(lengths, params.min_length)?;
    info!("loaded {} sequences", catalog.len());

    cluster_by_ani(&catalog, &ani_path, &params.cluster)
}
