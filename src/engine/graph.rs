use std::collections::{BTreeMap, BTreeSet};

use crate::model::Triple;

/// Undirected incidence view over triple patterns: the three elements of a
/// triple are pairwise adjacent.
#[derive(Debug, Clone)]
pub struct TripleGraph<'a> {
    triples: &'a [Triple],
    nodes: BTreeSet<&'a str>,
}

impl<'a> TripleGraph<'a> {
    pub fn build(triples: &'a [Triple]) -> Self {
        let nodes = triples.iter().flat_map(Triple::nodes).collect();
        Self { triples, nodes }
    }

    pub fn nodes(&self) -> &BTreeSet<&'a str> {
        &self.nodes
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    pub fn neighbours(&self, node: &str) -> BTreeSet<&'a str> {
        self.triples
            .iter()
            .filter(|triple| triple.nodes().contains(&node))
            .flat_map(Triple::nodes)
            .filter(|other| *other != node)
            .collect()
    }

    /// Maximal sets of nodes linked through shared triples, sorted by their
    /// smallest member.
    pub fn components(&self) -> Vec<BTreeSet<&'a str>> {
        let index: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (*node, position))
            .collect();

        let mut sets = DisjointSets::new(index.len());
        for triple in self.triples {
            let [subject, predicate, object] = triple.nodes().map(|node| index[node]);
            sets.union(subject, predicate);
            sets.union(subject, object);
        }

        let mut grouped: BTreeMap<usize, BTreeSet<&'a str>> = BTreeMap::new();
        for (node, position) in &index {
            let root = sets.find(*position);
            grouped.entry(root).or_default().insert(*node);
        }

        let mut components: Vec<BTreeSet<&'a str>> = grouped.into_values().collect();
        components.sort();
        components
    }
}

struct DisjointSets {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }

        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, left: usize, right: usize) {
        let left = self.find(left);
        let right = self.find(right);
        if left == right {
            return;
        }

        let (large, small) = if self.size[left] >= self.size[right] {
            (left, right)
        } else {
            (right, left)
        };
        self.parent[small] = large;
        self.size[large] += self.size[small];
    }
}

pub fn resolve_target<'t>(target: &'t str, bind_relations: &'t BTreeMap<String, String>) -> &'t str {
    bind_relations
        .get(target)
        .map(String::as_str)
        .unwrap_or(target)
}

pub fn all_targets_present(
    graph: &TripleGraph<'_>,
    targets: &[String],
    bind_relations: &BTreeMap<String, String>,
) -> bool {
    targets
        .iter()
        .all(|target| graph.contains(resolve_target(target, bind_relations)))
}

pub fn components(triples: &[Triple]) -> Vec<BTreeSet<&str>> {
    TripleGraph::build(triples).components()
}

pub fn every_component_touches_targets(
    triples: &[Triple],
    targets: &[String],
    bind_relations: &BTreeMap<String, String>,
) -> bool {
    let resolved: BTreeSet<&str> = targets
        .iter()
        .map(|target| resolve_target(target, bind_relations))
        .collect();

    components(triples)
        .iter()
        .all(|component| component.iter().any(|node| resolved.contains(node)))
}
