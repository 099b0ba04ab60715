//! Leiden community detection over the entity graph.
//!
//! Clusters the non-expired fact graph of one partition using the Leiden
//! algorithm from the `graphrs` crate. Entity ids are mapped to dense `u64`
//! indices for the solver and mapped back afterwards; member lists come back
//! sorted so repeated runs over the same graph compare equal.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Quality function used by the Leiden algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityFunctionType {
    /// Modularity-based quality function.
    Modularity,
    /// Constant Potts Model.
    CPM,
}

/// Community detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityParams {
    /// Quality function. Default: CPM.
    pub quality_function: QualityFunctionType,
    /// Resolution parameter. Larger values produce smaller communities.
    /// Default: 0.25.
    pub resolution: f64,
    /// Theta parameter (randomness in refinement). Default: 0.3.
    pub theta: f64,
    /// Gamma parameter (granularity). Default: 0.05.
    pub gamma: f64,
    /// Whether to use edge weights. Default: true.
    pub weighted: bool,
    /// Minimum number of entities a partition must hold before a build is
    /// worthwhile. Default: 20.
    pub min_entity_count: usize,
}

impl Default for CommunityParams {
    fn default() -> Self {
        Self {
            quality_function: QualityFunctionType::CPM,
            resolution: 0.25,
            theta: 0.3,
            gamma: 0.05,
            weighted: true,
            min_entity_count: 20,
        }
    }
}

/// Cluster entities from a weighted edge list.
///
/// Edges are `(source, target, weight)` over entity ids; weight is the count
/// of current facts on that edge. Self-loops are excluded and edges are
/// treated as undirected. Returns the clusters with members sorted, largest
/// cluster first.
pub fn cluster_entities(
    edges: &[(EntityId, EntityId, f32)],
    params: &CommunityParams,
) -> anyhow::Result<Vec<Vec<EntityId>>> {
    use graphrs::algorithms::community::leiden::{leiden, QualityFunction};
    use graphrs::{Edge as GEdge, EdgeDedupeStrategy, Graph, GraphSpecs};

    // Dense u64 indices for the solver.
    let mut index_of: HashMap<EntityId, u64> = HashMap::new();
    let mut entity_of: Vec<EntityId> = Vec::new();
    let mut intern = |id: EntityId, index_of: &mut HashMap<EntityId, u64>| -> u64 {
        *index_of.entry(id).or_insert_with(|| {
            entity_of.push(id);
            (entity_of.len() - 1) as u64
        })
    };

    let graphrs_edges: Vec<_> = edges
        .iter()
        .filter(|(s, t, _)| s != t)
        .map(|(s, t, w)| {
            let si = intern(*s, &mut index_of);
            let ti = intern(*t, &mut index_of);
            GEdge::with_weight(si, ti, *w as f64)
        })
        .collect();

    if graphrs_edges.is_empty() {
        return Ok(Vec::new());
    }

    let mut specs = GraphSpecs::undirected_create_missing();
    specs.edge_dedupe_strategy = EdgeDedupeStrategy::KeepLast;

    let graph = Graph::<u64, ()>::new_from_nodes_and_edges(vec![], graphrs_edges, specs)
        .map_err(|e| anyhow::anyhow!("failed to build graph: {}", e.message))?;

    let quality_fn = match params.quality_function {
        QualityFunctionType::Modularity => QualityFunction::Modularity,
        QualityFunctionType::CPM => QualityFunction::CPM,
    };

    let raw: Vec<HashSet<u64>> = leiden(
        &graph,
        params.weighted,
        quality_fn,
        Some(params.resolution),
        Some(params.theta),
        Some(params.gamma),
    )
    .map_err(|e| anyhow::anyhow!("leiden failed: {}", e.message))?;

    let mut clusters: Vec<Vec<EntityId>> = raw
        .into_iter()
        .map(|members| {
            let mut ids: Vec<EntityId> = members
                .into_iter()
                .map(|i| entity_of[i as usize])
                .collect();
            ids.sort_unstable();
            ids
        })
        .collect();
    clusters.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    Ok(clusters)
}
