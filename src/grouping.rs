// Adjacency Grouper - connected components over the static flat graph
//
// The adjacency relation is configuration: flat number -> neighbouring flat
// numbers. Key order and neighbour order are preserved exactly as supplied,
// which makes the grouping deterministic.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LedgerError, Result};

/// Static mapping from flat number to its neighbours
///
/// Every neighbour must itself be a key; a relation that points at an
/// unknown vertex is rejected when built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IndexMap<String, Vec<String>>", into = "IndexMap<String, Vec<String>>")]
pub struct Adjacency {
    neighbors: IndexMap<String, Vec<String>>,
}

impl Adjacency {
    pub fn new(neighbors: IndexMap<String, Vec<String>>) -> Result<Self> {
        for (vertex, list) in &neighbors {
            if let Some(missing) = list.iter().find(|n| !neighbors.contains_key(n.as_str())) {
                return Err(LedgerError::Config(format!(
                    "adjacency for {vertex} references {missing}, which has no entry of its own"
                )));
            }
        }
        Ok(Adjacency { neighbors })
    }

    /// Build from `(vertex, neighbours)` pairs in the given order
    pub fn from_pairs<'a, I, N>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, N)>,
        N: IntoIterator<Item = &'a str>,
    {
        let neighbors = pairs
            .into_iter()
            .map(|(vertex, list)| {
                (
                    vertex.to_string(),
                    list.into_iter().map(str::to_string).collect(),
                )
            })
            .collect();
        Adjacency::new(neighbors)
    }

    /// Parse a JSON object such as `{"101": ["102"], "102": ["101"]}`
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LedgerError::Config(format!("invalid adjacency JSON: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("cannot read adjacency file {}: {e}", path.display()))
        })?;
        let adjacency = Adjacency::from_json_str(&json)?;
        if adjacency.is_empty() {
            return Err(LedgerError::Config(format!(
                "adjacency file {} defines no flats",
                path.display()
            )));
        }
        Ok(adjacency)
    }

    /// Vertices in key order
    pub fn vertices(&self) -> impl Iterator<Item = &str> {
        self.neighbors.keys().map(String::as_str)
    }

    /// Neighbours in the order given; empty for an unknown vertex
    pub fn neighbors(&self, vertex: &str) -> &[String] {
        self.neighbors.get(vertex).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, vertex: &str) -> bool {
        self.neighbors.contains_key(vertex)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

impl TryFrom<IndexMap<String, Vec<String>>> for Adjacency {
    type Error = LedgerError;

    fn try_from(neighbors: IndexMap<String, Vec<String>>) -> Result<Self> {
        Adjacency::new(neighbors)
    }
}

impl From<Adjacency> for IndexMap<String, Vec<String>> {
    fn from(adjacency: Adjacency) -> Self {
        adjacency.neighbors
    }
}

/// Partition every key of the relation into connected components
///
/// Depth-first from each unvisited key, in key order. Members are appended
/// the first time they are reached, following neighbour lists in their given
/// order. The visited set is what terminates traversal on cycles.
pub fn compute_groups(adjacency: &Adjacency) -> Vec<Vec<String>> {
    let mut visited: IndexSet<&str> = IndexSet::with_capacity(adjacency.len());
    let mut groups = Vec::new();

    for start in adjacency.vertices() {
        if visited.contains(start) {
            continue;
        }

        let mut group = Vec::new();
        let mut stack = vec![start];

        while let Some(vertex) = stack.pop() {
            if !visited.insert(vertex) {
                continue;
            }
            group.push(vertex.to_string());

            // Reversed so the first neighbour is popped first
            stack.extend(
                adjacency
                    .neighbors(vertex)
                    .iter()
                    .rev()
                    .map(String::as_str)
                    .filter(|n| adjacency.contains(n) && !visited.contains(n)),
            );
        }

        groups.push(group);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample() -> Adjacency {
        Adjacency::from_pairs([
            ("101", vec!["102"]),
            ("102", vec!["101", "103"]),
            ("103", vec!["102"]),
            ("201", vec!["202"]),
            ("202", vec!["201", "203"]),
            ("203", vec!["202"]),
            ("301", vec!["302"]),
            ("302", vec!["301"]),
        ])
        .unwrap()
    }

    fn as_set(group: &[String]) -> BTreeSet<&str> {
        group.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_sample_graph_has_three_groups() {
        let groups = compute_groups(&sample());

        assert_eq!(groups.len(), 3);
        assert_eq!(as_set(&groups[0]), BTreeSet::from(["101", "102", "103"]));
        assert_eq!(as_set(&groups[1]), BTreeSet::from(["201", "202", "203"]));
        assert_eq!(as_set(&groups[2]), BTreeSet::from(["301", "302"]));
    }

    #[test]
    fn test_depth_first_order_follows_neighbour_lists() {
        // a -> [b, c], b -> [d]: depth first visits d before c
        let adjacency = Adjacency::from_pairs([
            ("a", vec!["b", "c"]),
            ("b", vec!["a", "d"]),
            ("c", vec!["a"]),
            ("d", vec!["b"]),
        ])
        .unwrap();

        assert_eq!(compute_groups(&adjacency), vec![vec!["a", "b", "d", "c"]]);
    }

    #[test]
    fn test_group_order_follows_key_order() {
        let adjacency = Adjacency::from_pairs([
            ("302", vec!["301"]),
            ("101", vec![]),
            ("301", vec!["302"]),
        ])
        .unwrap();

        let groups = compute_groups(&adjacency);
        assert_eq!(groups, vec![vec!["302", "301"], vec!["101"]]);
    }

    #[test]
    fn test_cycles_terminate() {
        let adjacency = Adjacency::from_pairs([
            ("1", vec!["2"]),
            ("2", vec!["3"]),
            ("3", vec!["1", "3"]),
        ])
        .unwrap();

        assert_eq!(compute_groups(&adjacency), vec![vec!["1", "2", "3"]]);
    }

    #[test]
    fn test_asymmetric_edges_still_join() {
        // 2 is only reachable from 1, but starting at 1 pulls it in
        let adjacency = Adjacency::from_pairs([("1", vec!["2"]), ("2", vec![])]).unwrap();
        assert_eq!(compute_groups(&adjacency), vec![vec!["1", "2"]]);
    }

    #[test]
    fn test_empty_neighbour_list_is_singleton() {
        let adjacency = Adjacency::from_pairs([("101", Vec::<&str>::new())]).unwrap();
        assert_eq!(compute_groups(&adjacency), vec![vec!["101"]]);
        assert!(compute_groups(&Adjacency::default()).is_empty());
    }

    #[test]
    fn test_dangling_neighbour_rejected() {
        let err = Adjacency::from_pairs([("101", vec!["999"])]).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));

        let err = Adjacency::from_json_str(r#"{"101": ["102"]}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }

    #[test]
    fn test_json_preserves_key_order() {
        let adjacency =
            Adjacency::from_json_str(r#"{"b": ["a"], "a": ["b"], "c": []}"#).unwrap();
        let keys: Vec<&str> = adjacency.vertices().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(compute_groups(&adjacency), vec![vec!["b", "a"], vec!["c"]]);
    }
}
