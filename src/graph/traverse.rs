//! Cycle detection and traversal queries.
//!
//! Cycle membership uses DFS-based strongly-connected components: a node is
//! in a cycle iff its component has two or more members, or it carries a
//! self-loop. Plain back-edge marking detects *that* a cycle exists but
//! under-reports membership when cycles overlap; component membership is
//! exact.
//!
//! Traversals are visited-set BFS over the arena indices, so cyclic graphs
//! terminate with the finite set of nodes reachable before revisiting.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::build::DependencyGraph;

/// Combined multi-node selection result for UI highlighting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

impl DependencyGraph {
    /// Flag every node that participates in at least one cycle.
    pub(super) fn mark_cycles(&mut self) {
        let node_count = self.nodes.len();
        let adjacency: Vec<Vec<usize>> = (0..node_count)
            .map(|node| {
                self.outgoing[node]
                    .iter()
                    .map(|&edge| self.endpoints[edge].1)
                    .collect()
            })
            .collect();

        let components = strongly_connected_components(&adjacency);
        let mut component_sizes = vec![0usize; node_count];
        for &component in &components {
            component_sizes[component] += 1;
        }

        for node in 0..node_count {
            let self_loop = adjacency[node].contains(&node);
            if component_sizes[components[node]] > 1 || self_loop {
                self.nodes[node].in_cycle = true;
            }
        }
    }

    /// Node ids reachable by walking edges *into* `node_id`, excluding the
    /// origin, optionally bounded by depth (`None` = unbounded). Sorted for
    /// stable output.
    #[must_use]
    pub fn upstream(&self, node_id: &str, max_depth: Option<usize>) -> Vec<String> {
        self.walk(node_id, max_depth, Direction::Upstream)
    }

    /// Symmetric to [`upstream`](Self::upstream), following edges *out of*
    /// `node_id`.
    #[must_use]
    pub fn downstream(&self, node_id: &str, max_depth: Option<usize>) -> Vec<String> {
        self.walk(node_id, max_depth, Direction::Downstream)
    }

    /// Aggregate upstream/downstream across several selected nodes,
    /// excluding the origins themselves.
    #[must_use]
    pub fn neighborhood(&self, node_ids: &[&str], max_depth: Option<usize>) -> Neighborhood {
        let origins: FxHashSet<&str> = node_ids.iter().copied().collect();
        let mut upstream = FxHashSet::default();
        let mut downstream = FxHashSet::default();

        for id in node_ids {
            upstream.extend(self.walk(id, max_depth, Direction::Upstream));
            downstream.extend(self.walk(id, max_depth, Direction::Downstream));
        }
        upstream.retain(|id| !origins.contains(id.as_str()));
        downstream.retain(|id| !origins.contains(id.as_str()));

        let mut upstream: Vec<String> = upstream.into_iter().collect();
        let mut downstream: Vec<String> = downstream.into_iter().collect();
        upstream.sort();
        downstream.sort();
        Neighborhood { upstream, downstream }
    }

    fn walk(&self, node_id: &str, max_depth: Option<usize>, direction: Direction) -> Vec<String> {
        let Some(&origin) = self.index.get(node_id) else {
            return Vec::new();
        };

        let mut visited = FxHashSet::default();
        visited.insert(origin);
        let mut frontier = vec![origin];
        let mut reached = Vec::new();
        let mut depth = 0;

        while !frontier.is_empty() && max_depth.map_or(true, |limit| depth < limit) {
            depth += 1;
            let mut next = Vec::new();
            for node in frontier {
                let (edge_list, pick): (&[usize], fn(&(usize, usize)) -> usize) = match direction {
                    Direction::Upstream => (&self.incoming[node], |e| e.0),
                    Direction::Downstream => (&self.outgoing[node], |e| e.1),
                };
                for &edge in edge_list {
                    let neighbor = pick(&self.endpoints[edge]);
                    if visited.insert(neighbor) {
                        reached.push(self.nodes[neighbor].id.clone());
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }

        reached.sort();
        reached
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
}

/// Tarjan's algorithm; returns the component id per node.
fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<usize> {
    struct Tarjan<'a> {
        adjacency: &'a [Vec<usize>],
        index: Vec<Option<usize>>,
        lowlink: Vec<usize>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        counter: usize,
        component: Vec<usize>,
        component_count: usize,
    }

    impl Tarjan<'_> {
        fn connect(&mut self, v: usize) {
            self.index[v] = Some(self.counter);
            self.lowlink[v] = self.counter;
            self.counter += 1;
            self.stack.push(v);
            self.on_stack[v] = true;

            for &w in &self.adjacency[v] {
                match self.index[w] {
                    None => {
                        self.connect(w);
                        self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.lowlink[v]) == self.index[v] {
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    self.component[w] = self.component_count;
                    if w == v {
                        break;
                    }
                }
                self.component_count += 1;
            }
        }
    }

    let node_count = adjacency.len();
    let mut tarjan = Tarjan {
        adjacency,
        index: vec![None; node_count],
        lowlink: vec![0; node_count],
        on_stack: vec![false; node_count],
        stack: Vec::new(),
        counter: 0,
        component: vec![0; node_count],
        component_count: 0,
    };
    for v in 0..node_count {
        if tarjan.index[v].is_none() {
            tarjan.connect(v);
        }
    }
    tarjan.component
}
