use crate::{FlowResult, PartitionError, Result, WeightedGraph};

/// The two sides of a minimum cut as independent subgraphs.
#[derive(Clone, Debug)]
pub struct Bisection {
    pub source_side: WeightedGraph,
    pub sink_side: WeightedGraph,
    /// Total capacity of the graph edges between the two sides.
    pub cut_capacity: f64,
}

/// Splits `graph` along the minimum cut found by a flow computed on its
/// augmented network. Vertices reachable from the source in the residual
/// network go to the source side, all others to the sink side. The virtual
/// terminals are dropped.
pub fn split_by_flow(graph: &WeightedGraph, flow: &FlowResult) -> Result<Bisection> {
    let n = graph.vertex_count();
    if flow.network.node_count() != n + 2 || flow.source < n || flow.sink < n {
        return Err(PartitionError::invariant(format!(
            "flow network with {} nodes and terminals {}/{} does not match a graph of {n} vertices",
            flow.network.node_count(),
            flow.source,
            flow.sink
        )));
    }

    let reachable = flow.source_side();
    let (source_members, sink_members): (Vec<usize>, Vec<usize>) = (0..n).partition(|&vx| reachable[vx]);

    let cut_capacity: f64 = graph
        .edges()
        .filter(|(a, b, _)| reachable[*a] != reachable[*b])
        .map(|(_, _, e)| e.capacity)
        .sum();

    let source_side = graph.induced_subgraph(&source_members);
    let sink_side = graph.induced_subgraph(&sink_members);
    if source_side.vertex_count() + sink_side.vertex_count() != n {
        return Err(PartitionError::invariant(format!(
            "split of {n} vertices produced {} + {}",
            source_side.vertex_count(),
            sink_side.vertex_count()
        )));
    }

    log::trace!(
        "split {n} vertices into {} / {} with cut {cut_capacity}",
        source_side.vertex_count(),
        sink_side.vertex_count()
    );
    Ok(Bisection {
        source_side,
        sink_side,
        cut_capacity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_util::*;
    use crate::{Dinic, FlowNetwork, MaxFlowSolver, TerminalSets};

    #[test]
    fn path_is_cut_at_the_middle_edge() {
        let mut graph = path_graph(4, 1.0);
        let a = *graph.vertex(1);
        let b = *graph.vertex(2);
        graph.add_edge_with_capacity(a, b, 1.0, 0.5);

        let sets = TerminalSets {
            source: vec![0],
            sink: vec![3],
            ..Default::default()
        };
        let (network, source, sink) = FlowNetwork::augmented(&graph, &sets).unwrap();
        let flow = Dinic.compute_max_flow(network, source, sink).unwrap();
        let bisection = split_by_flow(&graph, &flow).unwrap();

        assert_eq!(flow.value, 0.5);
        assert_eq!(bisection.cut_capacity, 0.5);
        let ids = |g: &WeightedGraph| g.vertices().iter().map(|v| v.id).collect::<Vec<_>>();
        assert_eq!(ids(&bisection.source_side), vec![0, 1]);
        assert_eq!(ids(&bisection.sink_side), vec![2, 3]);
        assert_eq!(bisection.source_side.edge_count(), 1);
        assert_eq!(bisection.sink_side.edge_count(), 1);
    }

    #[test]
    fn grid_split_keeps_every_vertex() {
        let graph = grid_graph(4, 4, 1.0);
        let sets = TerminalSets {
            source: vec![0, 1, 4],
            sink: vec![11, 14, 15],
            ..Default::default()
        };
        let (network, source, sink) = FlowNetwork::augmented(&graph, &sets).unwrap();
        let flow = Dinic.compute_max_flow(network, source, sink).unwrap();
        let bisection = split_by_flow(&graph, &flow).unwrap();

        assert_eq!(
            bisection.source_side.vertex_count() + bisection.sink_side.vertex_count(),
            16
        );
        assert_eq!(
            bisection.source_side.total_weight() + bisection.sink_side.total_weight(),
            graph.total_weight()
        );
        assert_eq!(bisection.cut_capacity, flow.value);
    }

    #[test]
    fn mismatched_network_is_an_invariant_violation() {
        let graph = grid_graph(2, 2, 1.0);
        let flow = Dinic.compute_max_flow(FlowNetwork::new(3), 0, 2).unwrap();
        let err = split_by_flow(&graph, &flow).unwrap_err();
        assert!(matches!(err, PartitionError::InvariantViolation(_)));
    }
}
