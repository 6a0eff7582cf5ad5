//! Element-level dependency graph: topological sort and cycle detection.
//!
//! The pipeline induces a directed graph over its elements from the pad
//! bindings (one edge per bound source→sink pair, deduplicated per element
//! pair). The scheduler walks elements in the topological order computed
//! here, so that within one tick every upstream `produce` happens before the
//! corresponding downstream `pull`.
//!
//! # Prior Art
//!
//! Topological sort and cycle detection use Kahn's algorithm:
//! - Kahn, A.B. (1962). "Topological sorting of large networks."
//!   Communications of the ACM, 5(11), 558–562.
//!
//! Ties between ready nodes are broken lexicographically by element name so
//! the execution order — and therefore the hook-call sequence every element
//! observes — is deterministic for a fixed graph.

use std::collections::BTreeSet;

use crate::error::RillError;

/// Directed graph over pipeline elements, indexed by insertion order.
#[derive(Debug, Default)]
pub struct Dag {
    /// Node names, index-aligned with the pipeline's element table.
    names: Vec<String>,
    /// Forward edges: node → downstream nodes.
    edges: Vec<BTreeSet<usize>>,
    /// Reverse edges: node → upstream nodes.
    reverse: Vec<BTreeSet<usize>>,
}

impl Dag {
    /// Create an empty graph.
    pub fn new() -> Self {
        Dag::default()
    }

    /// Add a node and return its index.
    pub fn add_node(&mut self, name: impl Into<String>) -> usize {
        self.names.push(name.into());
        self.edges.push(BTreeSet::new());
        self.reverse.push(BTreeSet::new());
        self.names.len() - 1
    }

    /// Add an edge from `from` to `to`. Parallel edges collapse to one.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.edges[from].insert(to);
        self.reverse[to].insert(from);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    /// Immediate upstream nodes of `node`, ascending by index.
    pub fn upstream(&self, node: usize) -> Vec<usize> {
        self.reverse[node].iter().copied().collect()
    }

    /// Immediate downstream nodes of `node`, ascending by index.
    pub fn downstream(&self, node: usize) -> Vec<usize> {
        self.edges[node].iter().copied().collect()
    }

    /// Check for cycles.
    ///
    /// Returns `Ok(())` if the graph is acyclic, or `CycleDetected` with the
    /// names of the nodes left unprocessed by Kahn's algorithm — exactly the
    /// nodes on or downstream-within a cycle.
    pub fn detect_cycles(&self) -> Result<(), RillError> {
        let processed = self.sort_inner();
        if processed.len() < self.names.len() {
            let seen: BTreeSet<usize> = processed.into_iter().collect();
            let mut cycle: Vec<String> = (0..self.names.len())
                .filter(|n| !seen.contains(n))
                .map(|n| self.names[n].clone())
                .collect();
            cycle.sort();
            Err(RillError::CycleDetected(cycle))
        } else {
            Ok(())
        }
    }

    /// Return all nodes in topological order (upstream first), or the cycle
    /// error if the order does not exist.
    pub fn topological_order(&self) -> Result<Vec<usize>, RillError> {
        self.detect_cycles()?;
        Ok(self.sort_inner())
    }

    // ── Private helpers ─────────────────────────────────────────────────

    /// Kahn's algorithm with a lexicographic tie-break.
    ///
    /// The ready set is ordered by (name rank, index); because node names
    /// are unique within a pipeline, the produced order is fully determined
    /// by the edge relation and the names.
    fn sort_inner(&self) -> Vec<usize> {
        let n = self.names.len();

        // Rank of each node in name-sorted order.
        let mut by_name: Vec<usize> = (0..n).collect();
        by_name.sort_by(|&a, &b| self.names[a].cmp(&self.names[b]));
        let mut rank = vec![0usize; n];
        for (r, &node) in by_name.iter().enumerate() {
            rank[node] = r;
        }

        let mut in_degree: Vec<usize> = vec![0; n];
        for targets in &self.edges {
            for &t in targets {
                in_degree[t] += 1;
            }
        }

        let mut ready: BTreeSet<(usize, usize)> = (0..n)
            .filter(|&node| in_degree[node] == 0)
            .map(|node| (rank[node], node))
            .collect();

        let mut result = Vec::with_capacity(n);
        while let Some(&(r, node)) = ready.iter().next() {
            ready.remove(&(r, node));
            result.push(node);
            for &d in &self.edges[node] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert((rank[d], d));
                }
            }
        }

        result
    }
}

// ── Unit tests ─────────────────────────────────────────────────────────────
