// src/clustering/entity_clustering.rs
use log::{debug, info, warn};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::core::RecordId;
use crate::models::matching::ScoredPair;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    pub record_id: RecordId,
    /// Mean probability of the member's accepted edges within the cluster.
    pub confidence: f64,
}

/// How tightly a cluster hangs together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoherenceScore {
    /// Ratio of accepted edges to possible edges in the cluster (0.0 to 1.0)
    pub density: f64,
    pub average_confidence: f64,
    pub confidence_std_dev: f64,
    pub total_edges: usize,
    pub cluster_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    /// Positional, starting at 0.
    pub id: usize,
    /// Sorted by record id.
    pub members: Vec<ClusterMember>,
    pub coherence: CoherenceScore,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.members.iter().any(|m| m.record_id == record_id)
    }

    pub fn record_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.record_id.as_str()).collect()
    }
}

/// Where one record ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Membership {
    Clustered { cluster_id: usize, confidence: f64 },
    Unclustered,
}

/// Groups records linked by pairs scored at or above `threshold` into
/// connected components.
///
/// Records without an accepted edge are left out. Components are numbered in
/// order of their smallest record id and members are sorted by id, so the
/// result does not depend on the order of `scored_pairs`. A pair listed more
/// than once keeps its highest probability.
pub fn cluster(scored_pairs: &[ScoredPair], threshold: f64) -> Vec<Cluster> {
    info!("Identifying clusters using connected components (threshold {:.2})...", threshold);

    let mut accepted: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    let mut rejected_nan = 0;
    for scored in scored_pairs {
        if scored.probability.is_nan() {
            rejected_nan += 1;
            continue;
        }
        if scored.probability < threshold {
            continue;
        }
        let key = (scored.pair.id_1.as_str(), scored.pair.id_2.as_str());
        let entry = accepted.entry(key).or_insert(scored.probability);
        *entry = entry.max(scored.probability);
    }
    if rejected_nan > 0 {
        warn!("Ignored {} scored pairs with an undefined probability", rejected_nan);
    }

    let node_ids: BTreeSet<&str> = accepted.keys().flat_map(|(a, b)| [*a, *b]).collect();
    let mut graph: UnGraph<&str, f64> = UnGraph::new_undirected();
    let mut id_to_node: HashMap<&str, NodeIndex> = HashMap::new();
    for id in &node_ids {
        id_to_node.insert(*id, graph.add_node(*id));
    }
    for ((a, b), probability) in &accepted {
        graph.add_edge(id_to_node[a], id_to_node[b], probability.clamp(0.0, 1.0));
    }
    debug!(
        "Match graph: {} nodes, {} accepted edges",
        graph.node_count(),
        graph.edge_count()
    );

    // Node indices follow record id order, so the scan below discovers
    // components by their smallest id.
    let mut visited = vec![false; graph.node_count()];
    let mut components: Vec<Vec<NodeIndex>> = Vec::new();
    for node_idx in graph.node_indices() {
        if visited[node_idx.index()] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![node_idx];
        while let Some(current) = stack.pop() {
            if visited[current.index()] {
                continue;
            }
            visited[current.index()] = true;
            component.push(current);
            for neighbor in graph.neighbors(current) {
                if !visited[neighbor.index()] {
                    stack.push(neighbor);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }

    let clusters: Vec<Cluster> = components
        .iter()
        .enumerate()
        .map(|(id, component)| build_cluster(&graph, id, component))
        .collect();

    let clustered_records: usize = clusters.iter().map(Cluster::len).sum();
    info!(
        "Found {} clusters covering {} records",
        clusters.len(),
        clustered_records
    );
    clusters
}

fn build_cluster(graph: &UnGraph<&str, f64>, id: usize, component: &[NodeIndex]) -> Cluster {
    let mut members = Vec::with_capacity(component.len());
    let mut edge_weights = Vec::new();
    for &node in component {
        let incident: Vec<f64> = graph.edges(node).map(|e| *e.weight()).collect();
        for edge in graph.edges(node) {
            let other = if edge.source() == node {
                edge.target()
            } else {
                edge.source()
            };
            // Count each edge once, from its lower endpoint.
            if other > node {
                edge_weights.push(*edge.weight());
            }
        }
        let confidence = if incident.is_empty() {
            0.0
        } else {
            incident.iter().sum::<f64>() / incident.len() as f64
        };
        members.push(ClusterMember {
            record_id: graph[node].to_string(),
            confidence,
        });
    }

    let coherence = calculate_coherence_score(component.len(), &edge_weights);
    debug!(
        "Cluster {}: {} records, density {:.2}, average confidence {:.3} (std dev {:.3})",
        id,
        coherence.cluster_size,
        coherence.density,
        coherence.average_confidence,
        coherence.confidence_std_dev
    );

    Cluster {
        id,
        members,
        coherence,
    }
}

fn calculate_coherence_score(cluster_size: usize, edge_weights: &[f64]) -> CoherenceScore {
    if cluster_size <= 1 {
        return CoherenceScore {
            cluster_size,
            ..Default::default()
        };
    }

    let total_edges = edge_weights.len();
    let possible_edges = (cluster_size * (cluster_size - 1)) / 2;
    let density = total_edges as f64 / possible_edges as f64;

    let average_confidence = if edge_weights.is_empty() {
        0.0
    } else {
        edge_weights.iter().sum::<f64>() / total_edges as f64
    };
    let confidence_variance = if total_edges > 1 {
        edge_weights
            .iter()
            .map(|&c| (c - average_confidence).powi(2))
            .sum::<f64>()
            / total_edges as f64
    } else {
        0.0
    };

    CoherenceScore {
        density,
        average_confidence,
        confidence_std_dev: confidence_variance.sqrt(),
        total_edges,
        cluster_size,
    }
}

/// Appends a one-member cluster (confidence 1.0) for every record that is not
/// yet clustered, numbered after the existing clusters in record id order.
pub fn with_singletons<'a>(
    mut clusters: Vec<Cluster>,
    record_ids: impl IntoIterator<Item = &'a str>,
) -> Vec<Cluster> {
    let clustered: BTreeSet<&str> = clusters
        .iter()
        .flat_map(|c| c.members.iter().map(|m| m.record_id.as_str()))
        .collect();
    let loners: BTreeSet<&str> = record_ids
        .into_iter()
        .filter(|id| !clustered.contains(id))
        .collect();
    let mut next_id = clusters.len();
    let singletons: Vec<Cluster> = loners
        .into_iter()
        .map(|id| {
            let cluster = Cluster {
                id: next_id,
                members: vec![ClusterMember {
                    record_id: id.to_string(),
                    confidence: 1.0,
                }],
                coherence: CoherenceScore {
                    cluster_size: 1,
                    ..Default::default()
                },
            };
            next_id += 1;
            cluster
        })
        .collect();
    clusters.extend(singletons);
    clusters
}

/// One entry per record id: its cluster and confidence, or `Unclustered`.
pub fn assign_memberships<'a>(
    record_ids: impl IntoIterator<Item = &'a str>,
    clusters: &[Cluster],
) -> BTreeMap<RecordId, Membership> {
    let mut by_record: HashMap<&str, Membership> = HashMap::new();
    for cluster in clusters {
        for member in &cluster.members {
            by_record.insert(
                member.record_id.as_str(),
                Membership::Clustered {
                    cluster_id: cluster.id,
                    confidence: member.confidence,
                },
            );
        }
    }
    record_ids
        .into_iter()
        .map(|id| {
            let membership = by_record.get(id).cloned().unwrap_or(Membership::Unclustered);
            (id.to_string(), membership)
        })
        .collect()
}
