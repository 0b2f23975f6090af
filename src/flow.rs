use crate::{PartitionError, Result, TerminalSets, WeightedGraph};
use std::collections::VecDeque;

/// Residual capacities at or below this are treated as saturated.
pub const FLOW_EPSILON: f64 = 1e-9;

/// Capacity of the edges joining the virtual terminals to their sets.
pub const UNBOUNDED: f64 = f64::INFINITY;

#[derive(Copy, Clone, Debug)]
struct FlowEdge {
    capacity: f64,
    /// Flow from the edge's first endpoint to its second. The opposite
    /// direction reads the negated value, so the pair can never disagree.
    flow: f64,
}

/// One direction of an undirected network edge.
#[derive(Copy, Clone, Debug)]
pub struct FlowArc {
    pub head: usize,
    pub edge: usize,
    forward: bool,
}

/// Undirected flow network. Every edge is stored once in an arena and both
/// directions share its single flow slot.
#[derive(Clone, Debug, Default)]
pub struct FlowNetwork {
    adjacency: Vec<Vec<FlowArc>>,
    edges: Vec<FlowEdge>,
}

impl FlowNetwork {
    pub fn new(nodes: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); nodes],
            edges: Vec::new(),
        }
    }

    /// Clones `graph` into a network and attaches a virtual source joined to
    /// every source-side terminal and a virtual sink joined to every sink-side
    /// terminal, both with unbounded capacity. Node `i < n` is vertex `i` of
    /// the graph, the source is node `n` and the sink node `n + 1`.
    pub fn augmented(graph: &WeightedGraph, sets: &TerminalSets) -> Result<(FlowNetwork, usize, usize)> {
        let n = graph.vertex_count();
        let mut terminal = vec![false; n];
        for &vx in sets.source.iter() {
            terminal[vx] = true;
        }
        if let Some(&shared) = sets.sink.iter().find(|&&vx| terminal[vx]) {
            return Err(PartitionError::invariant(format!(
                "vertex {} is in both terminal sets",
                graph.vertex(shared).id
            )));
        }

        let mut network = FlowNetwork::new(n);
        for (a, b, e) in graph.edges() {
            network.add_edge(a, b, e.capacity);
        }
        let source = network.add_node();
        let sink = network.add_node();
        for &vx in sets.source.iter() {
            network.add_edge(source, vx, UNBOUNDED);
        }
        for &vx in sets.sink.iter() {
            network.add_edge(vx, sink, UNBOUNDED);
        }

        if network.node_count() != n + 2 {
            return Err(PartitionError::invariant(format!(
                "augmented network has {} nodes, expected {}",
                network.node_count(),
                n + 2
            )));
        }
        Ok((network, source, sink))
    }

    pub fn add_node(&mut self) -> usize {
        self.adjacency.push(Vec::new());
        self.adjacency.len() - 1
    }

    /// Adds an undirected edge and returns its arena index.
    pub fn add_edge(&mut self, a: usize, b: usize, capacity: f64) -> usize {
        let edge = self.edges.len();
        self.edges.push(FlowEdge {
            capacity,
            flow: 0.0,
        });
        self.adjacency[a].push(FlowArc {
            head: b,
            edge,
            forward: true,
        });
        self.adjacency[b].push(FlowArc {
            head: a,
            edge,
            forward: false,
        });
        edge
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn arcs(&self, node: usize) -> &[FlowArc] {
        &self.adjacency[node]
    }

    pub fn capacity(&self, arc: &FlowArc) -> f64 {
        self.edges[arc.edge].capacity
    }

    /// Flow along the arc, negative if it runs the other way.
    pub fn flow(&self, arc: &FlowArc) -> f64 {
        let flow = self.edges[arc.edge].flow;
        if arc.forward {
            flow
        } else {
            -flow
        }
    }

    pub fn residual(&self, arc: &FlowArc) -> f64 {
        self.capacity(arc) - self.flow(arc)
    }

    /// Pushes `amount` along the arc. The reverse direction sees the same
    /// change negated.
    pub fn push(&mut self, arc: &FlowArc, amount: f64) {
        let edge = &mut self.edges[arc.edge];
        if arc.forward {
            edge.flow += amount;
        } else {
            edge.flow -= amount;
        }
    }

    /// Outbound minus inbound flow at a node.
    pub fn net_outflow(&self, node: usize) -> f64 {
        self.adjacency[node].iter().map(|arc| self.flow(arc)).sum()
    }

    /// Marks every node reachable from `start` over arcs with residual capacity.
    pub fn residual_reachable(&self, start: usize) -> Vec<bool> {
        let mut reached = vec![false; self.node_count()];
        let mut queue = VecDeque::new();
        reached[start] = true;
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            for arc in self.adjacency[node].iter() {
                if !reached[arc.head] && self.residual(arc) > FLOW_EPSILON {
                    reached[arc.head] = true;
                    queue.push_back(arc.head);
                }
            }
        }
        reached
    }

    /// Total capacity of the edges with exactly one endpoint on the marked side.
    pub fn cut_capacity(&self, side: &[bool]) -> f64 {
        self.adjacency
            .iter()
            .enumerate()
            .filter(|(node, _)| side[*node])
            .flat_map(|(_, arcs)| arcs.iter())
            .filter(|arc| !side[arc.head])
            .map(|arc| self.capacity(arc))
            .sum()
    }
}

/// Maximum flow between two nodes together with the network carrying it.
#[derive(Clone, Debug)]
pub struct FlowResult {
    pub value: f64,
    pub network: FlowNetwork,
    pub source: usize,
    pub sink: usize,
}

impl FlowResult {
    /// The source side of the minimum cut: nodes still reachable from the
    /// source in the residual network.
    pub fn source_side(&self) -> Vec<bool> {
        self.network.residual_reachable(self.source)
    }

    pub fn min_cut_capacity(&self) -> f64 {
        self.network.cut_capacity(&self.source_side())
    }
}

/// Computes a maximum flow. Implementations take ownership of the network and
/// hand it back with final flow values on every edge.
pub trait MaxFlowSolver {
    fn compute_max_flow(&self, network: FlowNetwork, source: usize, sink: usize) -> Result<FlowResult>;
}

/// Dinic's blocking flow algorithm.
#[derive(Copy, Clone, Debug, Default)]
pub struct Dinic;

impl MaxFlowSolver for Dinic {
    fn compute_max_flow(&self, mut network: FlowNetwork, source: usize, sink: usize) -> Result<FlowResult> {
        let n = network.node_count();
        if source >= n || sink >= n || source == sink {
            return Err(PartitionError::InvalidParameter(format!(
                "source {source} and sink {sink} must be distinct nodes below {n}"
            )));
        }

        let mut level = vec![u32::MAX; n];
        let mut cursor = vec![0usize; n];
        let mut path = Vec::new();
        let mut value = 0.0;
        let mut phases = 0;

        while assign_levels(&network, source, sink, &mut level) {
            phases += 1;
            cursor.fill(0);
            loop {
                let pushed = augment(&mut network, source, sink, &level, &mut cursor, &mut path);
                if pushed <= FLOW_EPSILON {
                    break;
                }
                if !pushed.is_finite() {
                    return Err(PartitionError::invariant(
                        "augmenting path of unbounded capacity between source and sink",
                    ));
                }
                value += pushed;
            }
        }

        log::trace!("dinic: flow {value} after {phases} phases");
        Ok(FlowResult {
            value,
            network,
            source,
            sink,
        })
    }
}

/// Breadth first search over residual arcs. Returns whether the sink got a level.
fn assign_levels(network: &FlowNetwork, source: usize, sink: usize, level: &mut [u32]) -> bool {
    level.fill(u32::MAX);
    level[source] = 0;
    let mut queue = VecDeque::new();
    queue.push_back(source);

    while let Some(node) = queue.pop_front() {
        for arc in network.arcs(node) {
            if level[arc.head] == u32::MAX && network.residual(arc) > FLOW_EPSILON {
                level[arc.head] = level[node] + 1;
                queue.push_back(arc.head);
            }
        }
    }
    level[sink] != u32::MAX
}

/// Finds one source to sink path that climbs exactly one level per arc and
/// saturates its bottleneck. `cursor` holds, per node, the first arc not yet
/// known to be useless in this phase. Returns the amount pushed, 0 when the
/// phase is blocked.
fn augment(
    network: &mut FlowNetwork,
    source: usize,
    sink: usize,
    level: &[u32],
    cursor: &mut [usize],
    path: &mut Vec<(usize, FlowArc)>,
) -> f64 {
    path.clear();
    let mut node = source;

    while node != sink {
        let arcs = network.arcs(node);
        let mut next = None;
        while cursor[node] < arcs.len() {
            let arc = arcs[cursor[node]];
            if level[arc.head] == level[node] + 1 && network.residual(&arc) > FLOW_EPSILON {
                next = Some(arc);
                break;
            }
            cursor[node] += 1;
        }

        match next {
            Some(arc) => {
                path.push((node, arc));
                node = arc.head;
            }
            None => {
                // Dead end, retreat and skip the arc that led here.
                let Some((tail, _)) = path.pop() else {
                    return 0.0;
                };
                cursor[tail] += 1;
                node = tail;
            }
        }
    }

    let bottleneck = path
        .iter()
        .map(|(_, arc)| network.residual(arc))
        .fold(f64::INFINITY, f64::min);
    if bottleneck.is_finite() {
        for (_, arc) in path.iter() {
            network.push(arc, bottleneck);
        }
    }
    bottleneck
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_util::grid_graph;

    fn solve(network: FlowNetwork, source: usize, sink: usize) -> FlowResult {
        Dinic.compute_max_flow(network, source, sink).unwrap()
    }

    fn assert_conserved(result: &FlowResult) {
        for node in 0..result.network.node_count() {
            if node == result.source || node == result.sink {
                continue;
            }
            assert!(result.network.net_outflow(node).abs() < 1e-9, "node {node}");
        }
        let out = result.network.net_outflow(result.source);
        assert!((out - result.value).abs() < 1e-9);
        assert!((result.network.net_outflow(result.sink) + result.value).abs() < 1e-9);
    }

    #[test]
    fn parallel_paths() {
        // s = 0, a = 1, b = 2, t = 3
        let mut network = FlowNetwork::new(4);
        network.add_edge(0, 1, 3.0);
        network.add_edge(1, 3, 2.0);
        network.add_edge(0, 2, 4.0);
        network.add_edge(2, 3, 5.0);

        let result = solve(network, 0, 3);
        assert_eq!(result.value, 6.0);
        assert_eq!(result.min_cut_capacity(), 6.0);
        assert_eq!(result.source_side(), vec![true, true, false, false]);
        assert_conserved(&result);
    }

    #[test]
    fn diamond_with_cross_edge() {
        let mut network = FlowNetwork::new(4);
        network.add_edge(0, 1, 10.0);
        network.add_edge(0, 2, 10.0);
        network.add_edge(1, 2, 1.0);
        network.add_edge(1, 3, 4.0);
        network.add_edge(2, 3, 10.0);

        let result = solve(network, 0, 3);
        assert!((result.value - 14.0).abs() < 1e-9);
        assert!((result.min_cut_capacity() - result.value).abs() < 1e-9);
        assert_conserved(&result);
    }

    #[test]
    fn directions_share_one_flow_value() {
        let mut network = FlowNetwork::new(3);
        network.add_edge(0, 1, 2.5);
        network.add_edge(2, 1, 1.5);

        let result = solve(network, 0, 2);
        assert_eq!(result.value, 1.5);
        for node in 0..3 {
            for arc in result.network.arcs(node) {
                let back = result
                    .network
                    .arcs(arc.head)
                    .iter()
                    .find(|b| b.edge == arc.edge)
                    .unwrap();
                assert_eq!(result.network.flow(arc), -result.network.flow(back));
            }
        }
    }

    #[test]
    fn disconnected_terminals_carry_no_flow() {
        let mut network = FlowNetwork::new(4);
        network.add_edge(0, 1, 10.0);
        network.add_edge(2, 3, 5.0);
        let result = solve(network, 0, 3);
        assert_eq!(result.value, 0.0);
        assert_eq!(result.source_side(), vec![true, true, false, false]);
    }

    #[test]
    fn zero_capacity_edges_are_never_used() {
        let mut network = FlowNetwork::new(3);
        network.add_edge(0, 1, 0.0);
        network.add_edge(1, 2, 7.0);
        let result = solve(network, 0, 2);
        assert_eq!(result.value, 0.0);
        assert_eq!(result.min_cut_capacity(), 0.0);
    }

    #[test]
    fn rejects_bad_terminals() {
        assert!(Dinic.compute_max_flow(FlowNetwork::new(2), 0, 0).is_err());
        assert!(Dinic.compute_max_flow(FlowNetwork::new(2), 0, 5).is_err());
    }

    #[test]
    fn augmented_grid_rows() {
        let graph = grid_graph(3, 3, 10.0);
        let sets = TerminalSets {
            source: vec![0, 1, 2],
            sink: vec![6, 7, 8],
            ..Default::default()
        };
        let (network, source, sink) = FlowNetwork::augmented(&graph, &sets).unwrap();
        assert_eq!(network.node_count(), graph.vertex_count() + 2);
        assert_eq!(network.edge_count(), graph.edge_count() + 6);

        let result = solve(network, source, sink);
        assert_eq!(result.value, 30.0);
        assert_eq!(result.min_cut_capacity(), 30.0);
        assert_conserved(&result);
    }

    #[test]
    fn overlapping_terminal_sets_are_rejected() {
        let graph = grid_graph(2, 2, 1.0);
        let sets = TerminalSets {
            source: vec![0, 1],
            sink: vec![1, 3],
            ..Default::default()
        };
        let err = FlowNetwork::augmented(&graph, &sets).unwrap_err();
        assert!(matches!(err, PartitionError::InvariantViolation(_)));
    }
}
