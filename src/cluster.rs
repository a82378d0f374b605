//! Greedy ANI clustering over a sequence catalog.
//!
//! String ids are resolved to dense integer indexes once, at catalog load;
//! the adjacency relation and assignment state are index-addressed vectors,
//! so the greedy walk itself never touches a hash map.

use crate::ani::parse_summary_row;
use crate::error::DerepError;
use crate::table_io::open_reader;
use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, info};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;

/// Thresholds an edge must pass to link two sequences.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Minimum weighted percent identity.
    pub min_ani: f64,
    /// Minimum query coverage, percent.
    pub min_qcov: f64,
    /// Minimum target coverage, percent.
    pub min_tcov: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        ClusterParams {
            min_ani: 95.0,
            min_qcov: 0.0,
            min_tcov: 85.0,
        }
    }
}

/// Sequences eligible for clustering, in source-file order.
///
/// Insertion order is load-bearing: it breaks length ties during centroid
/// selection, so two runs over the same input produce identical clusters.
#[derive(Debug, Default)]
pub struct SequenceCatalog {
    seqs: IndexMap<String, u64>,
}

impl SequenceCatalog {
    /// Build from (id, length) pairs, dropping sequences below `min_length`.
    ///
    /// A catalog that ends up empty is an `EmptyInput` error: clustering
    /// nothing is always a misconfiguration.
    pub fn from_lengths<I>(lengths: I, min_length: u64) -> Result<Self>
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let seqs: IndexMap<String, u64> = lengths
            .into_iter()
            .filter(|(_, len)| *len >= min_length)
            .collect();

        if seqs.is_empty() {
            return Err(DerepError::EmptyInput(format!(
                "no sequences of length >= {min_length} to cluster"
            ))
            .into());
        }

        Ok(SequenceCatalog { seqs })
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    fn index_of(&self, name: &str) -> Option<u32> {
        self.seqs.get_index_of(name).map(|i| i as u32)
    }

    fn name(&self, index: u32) -> &str {
        self.seqs
            .get_index(index as usize)
            .map(|(name, _)| name.as_str())
            .unwrap_or_default()
    }

    fn length(&self, index: u32) -> u64 {
        self.seqs
            .get_index(index as usize)
            .map(|(_, len)| *len)
            .unwrap_or_default()
    }

    /// Indexes ordered by descending length; equal lengths keep catalog
    /// order (stable sort over insertion order).
    fn by_descending_length(&self) -> Vec<u32> {
        let mut order: Vec<u32> = (0..self.seqs.len() as u32).collect();
        order.sort_by_key(|&i| Reverse(self.length(i)));
        order
    }
}

/// Result of the greedy walk.
///
/// Clusters are keyed by centroid in creation order; members are listed in
/// assignment order with the centroid first. Every catalog sequence belongs
/// to exactly one cluster.
#[derive(Debug)]
pub struct Clustering {
    clusters: IndexMap<String, Vec<String>>,
}

impl Clustering {
    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Centroid → members (centroid first), in creation order.
    pub fn clusters(&self) -> &IndexMap<String, Vec<String>> {
        &self.clusters
    }

    /// Members of one cluster.
    pub fn members(&self, centroid: &str) -> Option<&[String]> {
        self.clusters.get(centroid).map(|m| m.as_slice())
    }

    /// The dereplicated set: one representative id per cluster.
    pub fn centroid_set(&self) -> HashSet<String> {
        self.clusters.keys().cloned().collect()
    }

    /// Centroid of the cluster a sequence was assigned to.
    pub fn centroid_of(&self, name: &str) -> Option<&str> {
        self.clusters.iter().find_map(|(centroid, members)| {
            members
                .iter()
                .any(|m| m == name)
                .then_some(centroid.as_str())
        })
    }
}

/// Build the directed adjacency relation from the summary artifact.
///
/// Self-pairs never create an edge. Rows naming a sequence absent from the
/// catalog are dropped silently (expected consequence of the independent
/// minimum-length filter). Edges are directed q → t and never symmetrized,
/// since qcov/tcov are asymmetric.
fn load_edges<P: AsRef<Path>>(
    catalog: &SequenceCatalog,
    summary_path: P,
    params: &ClusterParams,
) -> Result<Vec<Vec<u32>>> {
    let mut reader = open_reader(&summary_path)?;
    let mut edges: Vec<Vec<u32>> = vec![Vec::new(); catalog.len()];

    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(DerepError::EmptyInput(format!(
            "summary file {} is empty",
            summary_path.as_ref().display()
        ))
        .into());
    }

    let mut line_no = 1u64;
    let mut rows = 0u64;
    let mut kept = 0u64;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;
        rows += 1;

        let row = parse_summary_row(&line, line_no)?;

        if row.qname == row.tname {
            continue;
        }
        let (Some(q), Some(t)) = (catalog.index_of(&row.qname), catalog.index_of(&row.tname))
        else {
            continue;
        };
        if row.qcov < params.min_qcov || row.tcov < params.min_tcov || row.pid < params.min_ani {
            continue;
        }

        edges[q as usize].push(t);
        kept += 1;
    }

    if rows == 0 {
        return Err(DerepError::EmptyInput(format!(
            "summary file {} has no data rows",
            summary_path.as_ref().display()
        ))
        .into());
    }

    info!("loaded {kept} of {rows} pairwise edges passing thresholds");
    Ok(edges)
}

/// Greedily partition the catalog into clusters.
///
/// Sequences are visited longest first. Each still-unassigned sequence opens
/// a cluster as its centroid and absorbs its still-unassigned out-neighbors.
/// The walk is one level deep: a member's own edges are never followed, so a
/// cluster is exactly "centroid plus its unclaimed direct targets", not a
/// connected component.
pub fn cluster_by_ani<P: AsRef<Path>>(
    catalog: &SequenceCatalog,
    summary_path: P,
    params: &ClusterParams,
) -> Result<Clustering> {
    info!("clustering {} sequences", catalog.len());
    let edges = load_edges(catalog, summary_path, params)?;

    debug!("performing greedy clustering");
    let mut assigned: Vec<Option<u32>> = vec![None; catalog.len()];
    let mut clusters: IndexMap<u32, Vec<u32>> = IndexMap::new();

    for seq in catalog.by_descending_length() {
        if assigned[seq as usize].is_some() {
            continue;
        }

        assigned[seq as usize] = Some(seq);
        let mut members = vec![seq];

        for &neighbor in &edges[seq as usize] {
            if assigned[neighbor as usize].is_none() {
                assigned[neighbor as usize] = Some(seq);
                members.push(neighbor);
            }
        }

        clusters.insert(seq, members);
    }

    info!("created {} clusters", clusters.len());

    Ok(Clustering {
        clusters: clusters
            .into_iter()
            .map(|(centroid, members)| {
                (
                    catalog.name(centroid).to_string(),
                    members
                        .into_iter()
                        .map(|m| catalog.name(m).to_string())
                        .collect(),
                )
            })
            .collect(),
    })
}
