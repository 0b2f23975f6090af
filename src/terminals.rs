use crate::{PartitionError, Result, WeightedGraph};
use std::collections::VecDeque;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Side {
    Source = 0,
    Sink = 1,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Source => Side::Sink,
            Side::Sink => Side::Source,
        }
    }
}

/// Two disjoint, individually connected vertex sets grown from opposite ends
/// of a projection order.
#[derive(Clone, Debug, Default)]
pub struct TerminalSets {
    /// Source-side vertex indices, ascending.
    pub source: Vec<usize>,
    /// Sink-side vertex indices, ascending.
    pub sink: Vec<usize>,
    pub source_weight: u64,
    pub sink_weight: u64,
    /// Growth rounds that were run.
    pub rounds: u32,
    /// Vertices moved from one set to the other.
    pub steals: u32,
}

/// Grows the terminal sets with a bidirectional breadth first search.
///
/// Each round expands both sides by one layer. A side that meets a vertex of
/// the other side may steal it, and a side that stalls below its target tries
/// to steal along the shared border instead.
pub struct TerminalSetBuilder<'a> {
    graph: &'a WeightedGraph,
    membership: Vec<Option<Side>>,
    target: [u64; 2],
    weight: [u64; 2],
    count: [usize; 2],
    frontier: [Vec<usize>; 2],
    steals: u32,
}

impl<'a> TerminalSetBuilder<'a> {
    pub fn new(graph: &'a WeightedGraph, target_source: u64, target_sink: u64) -> Self {
        Self {
            graph,
            membership: vec![None; graph.vertex_count()],
            target: [target_source, target_sink],
            weight: [0; 2],
            count: [0; 2],
            frontier: [Vec::new(), Vec::new()],
            steals: 0,
        }
    }

    /// Seeds the source with the first vertex of `order` and the sink with the
    /// last one, then grows both for at most `max_rounds` rounds. Sets that end
    /// below target are returned as they are.
    pub fn grow(mut self, order: &[usize], max_rounds: u32) -> Result<TerminalSets> {
        let (Some(&first), Some(&last)) = (order.first(), order.last()) else {
            return Ok(TerminalSets::default());
        };
        self.claim(first, Side::Source);
        if last != first {
            self.claim(last, Side::Sink);
        }

        let mut rounds = 0;
        while rounds < max_rounds && !(self.reached(Side::Source) && self.reached(Side::Sink)) {
            rounds += 1;
            let mut progress = false;
            for side in [Side::Source, Side::Sink] {
                if self.reached(side) {
                    continue;
                }
                let mut grew = self.expand_layer(side);
                if !grew {
                    grew = self.try_steal_vertices(side);
                }
                progress |= grew;
            }
            if !progress {
                log::trace!("terminal growth stalled after {rounds} rounds");
                break;
            }
        }

        self.finish(rounds)
    }

    fn reached(&self, side: Side) -> bool {
        self.weight[side as usize] >= self.target[side as usize]
    }

    fn claim(&mut self, vx: usize, side: Side) {
        self.membership[vx] = Some(side);
        self.weight[side as usize] += self.graph.vertex(vx).weight;
        self.count[side as usize] += 1;
        self.frontier[side as usize].push(vx);
    }

    fn transfer(&mut self, vx: usize, thief: Side) {
        let victim = thief.other();
        self.weight[victim as usize] -= self.graph.vertex(vx).weight;
        self.count[victim as usize] -= 1;
        self.claim(vx, thief);
        self.steals += 1;
    }

    /// Expands one breadth first layer of `side`. Returns whether any vertex was
    /// added.
    fn expand_layer(&mut self, side: Side) -> bool {
        let graph = self.graph;
        let layer = std::mem::take(&mut self.frontier[side as usize]);
        let mut grew = false;

        for (pos, &vx) in layer.iter().enumerate() {
            if self.membership[vx] != Some(side) {
                continue;
            }
            for e in graph.neighbours(vx) {
                let u = e.dst;
                match self.membership[u] {
                    None => {
                        self.claim(u, side);
                        grew = true;
                    }
                    Some(owner) if owner != side => {
                        if self.can_steal(u, side) {
                            self.transfer(u, side);
                            grew = true;
                        }
                    }
                    Some(_) => {}
                }
                if self.reached(side) {
                    // Keep the unexpanded rest of the layer around.
                    self.frontier[side as usize].extend_from_slice(&layer[pos..]);
                    return grew;
                }
            }
        }
        grew
    }

    /// A vertex may move from the opposite set to `thief` if it hangs off that
    /// set by a single edge, the set stays connected without it, and the set
    /// keeps at least its own target weight.
    fn can_steal(&self, vx: usize, thief: Side) -> bool {
        let victim = thief.other();
        if self.membership[vx] != Some(victim) {
            return false;
        }
        let w = self.graph.vertex(vx).weight;
        if self.weight[victim as usize] < self.target[victim as usize] + w {
            return false;
        }

        let mut inside = self
            .graph
            .neighbours(vx)
            .iter()
            .filter(|e| self.membership[e.dst] == Some(victim));
        let (Some(anchor), None) = (inside.next(), inside.next()) else {
            return false;
        };
        self.connected_without(victim, anchor.dst, vx)
    }

    /// Checks that every member of `side` other than `excluded` is reachable
    /// from `start` through members of `side`.
    fn connected_without(&self, side: Side, start: usize, excluded: usize) -> bool {
        let mut seen = vec![false; self.membership.len()];
        let mut queue = VecDeque::new();
        seen[start] = true;
        seen[excluded] = true;
        queue.push_back(start);
        let mut reached = 1;

        while let Some(vx) = queue.pop_front() {
            for e in self.graph.neighbours(vx) {
                if !seen[e.dst] && self.membership[e.dst] == Some(side) {
                    seen[e.dst] = true;
                    reached += 1;
                    queue.push_back(e.dst);
                }
            }
        }
        reached == self.count[side as usize] - 1
    }

    /// Fallback for a stalled side: steal border vertices of the opposite set,
    /// heaviest first, until the target is met or nothing qualifies.
    fn try_steal_vertices(&mut self, thief: Side) -> bool {
        let victim = thief.other();
        let mut candidates: Vec<usize> = (0..self.membership.len())
            .filter(|&vx| self.membership[vx] == Some(thief))
            .flat_map(|vx| self.graph.neighbours(vx).iter().map(|e| e.dst))
            .filter(|&u| self.membership[u] == Some(victim))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        candidates.sort_by_key(|&vx| std::cmp::Reverse(self.graph.vertex(vx).weight));

        let mut grew = false;
        for vx in candidates {
            if self.reached(thief) {
                break;
            }
            if self.can_steal(vx, thief) {
                self.transfer(vx, thief);
                grew = true;
            }
        }
        if grew {
            log::trace!("{thief:?} side stole border vertices, weight now {}", self.weight[thief as usize]);
        }
        grew
    }

    fn finish(self, rounds: u32) -> Result<TerminalSets> {
        let mut sets = TerminalSets {
            rounds,
            steals: self.steals,
            source_weight: self.weight[Side::Source as usize],
            sink_weight: self.weight[Side::Sink as usize],
            ..Default::default()
        };
        for (vx, side) in self.membership.iter().enumerate() {
            match side {
                Some(Side::Source) => sets.source.push(vx),
                Some(Side::Sink) => sets.sink.push(vx),
                None => {}
            }
        }

        for (side, members) in [(Side::Source, &sets.source), (Side::Sink, &sets.sink)] {
            if members.len() != self.count[side as usize] {
                return Err(PartitionError::invariant(format!(
                    "{side:?} terminal set holds {} vertices but {} were counted",
                    members.len(),
                    self.count[side as usize]
                )));
            }
            if let Some(&start) = members.first() {
                let induced = self.graph.induced_subgraph(members);
                if !induced.is_connected() {
                    return Err(PartitionError::invariant(format!(
                        "{side:?} terminal set grown from vertex {start} is disconnected"
                    )));
                }
            }
        }
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_util::*;
    use crate::{select_direction, Vertex};

    fn is_disjoint(sets: &TerminalSets) -> bool {
        sets.source.iter().all(|v| !sets.sink.contains(v))
    }

    #[test]
    fn path_grows_from_both_ends() {
        let graph = path_graph(4, 1.0);
        let sets = TerminalSetBuilder::new(&graph, 2, 2).grow(&[0, 1, 2, 3], 16).unwrap();
        assert_eq!(sets.source, vec![0, 1]);
        assert_eq!(sets.sink, vec![2, 3]);
        assert_eq!(sets.source_weight, 2);
        assert_eq!(sets.sink_weight, 2);
    }

    #[test]
    fn grid_sets_are_disjoint_and_connected() {
        let graph = grid_graph(6, 6, 1.0);
        let projection = select_direction(graph.vertices()).unwrap();
        let sets = TerminalSetBuilder::new(&graph, 9, 9)
            .grow(&projection.order, 64)
            .unwrap();
        assert!(is_disjoint(&sets));
        assert!(sets.source_weight >= 9);
        assert!(sets.sink_weight >= 9);
        assert!(graph.induced_subgraph(&sets.source).is_connected());
        assert!(graph.induced_subgraph(&sets.sink).is_connected());
    }

    #[test]
    fn round_budget_limits_growth() {
        let graph = path_graph(10, 1.0);
        let order: Vec<usize> = (0..10).collect();
        let sets = TerminalSetBuilder::new(&graph, 5, 5).grow(&order, 1).unwrap();
        assert_eq!(sets.rounds, 1);
        assert_eq!(sets.source, vec![0, 1]);
        assert_eq!(sets.sink, vec![8, 9]);
    }

    #[test]
    fn stalled_side_steals_a_leaf() {
        let graph = path_graph(5, 1.0);
        let mut builder = TerminalSetBuilder::new(&graph, 2, 3);
        for vx in 0..3 {
            builder.claim(vx, Side::Source);
        }
        for vx in 3..5 {
            builder.claim(vx, Side::Sink);
        }

        assert!(!builder.can_steal(1, Side::Sink));
        assert!(builder.try_steal_vertices(Side::Sink));
        assert_eq!(builder.membership[2], Some(Side::Sink));
        assert_eq!(builder.weight, [2, 3]);

        // The source is back at its target and keeps what it has.
        assert!(!builder.try_steal_vertices(Side::Sink));
        let sets = builder.finish(0).unwrap();
        assert_eq!(sets.source, vec![0, 1]);
        assert_eq!(sets.sink, vec![2, 3, 4]);
        assert_eq!(sets.steals, 1);
    }

    #[test]
    fn growth_steals_from_an_overgrown_side() {
        // 0 - 1 - 2 - 3 where vertex 1 is heavy. The source overshoots by
        // claiming it, so the sink may steal vertex 2.
        let mut graph = WeightedGraph::new();
        let v: Vec<Vertex> = [1, 6, 1, 1]
            .iter()
            .enumerate()
            .map(|(i, &w)| Vertex::new(i as u64, i as f64, 0.0, w))
            .collect();
        graph.add_edge(v[0], v[1], 1.0);
        graph.add_edge(v[1], v[2], 1.0);
        graph.add_edge(v[2], v[3], 1.0);

        let mut builder = TerminalSetBuilder::new(&graph, 2, 2);
        builder.claim(0, Side::Source);
        builder.claim(1, Side::Source);
        builder.claim(2, Side::Source);
        builder.claim(3, Side::Sink);
        builder.frontier = [Vec::new(), vec![3]];

        assert!(builder.expand_layer(Side::Sink));
        let sets = builder.finish(1).unwrap();
        assert_eq!(sets.source, vec![0, 1]);
        assert_eq!(sets.sink, vec![2, 3]);
        assert_eq!(sets.source_weight, 7);
        assert_eq!(sets.sink_weight, 2);
    }

    #[test]
    fn single_vertex_only_seeds_the_source() {
        let graph = path_graph(1, 1.0);
        let sets = TerminalSetBuilder::new(&graph, 1, 1).grow(&[0], 4).unwrap();
        assert_eq!(sets.source, vec![0]);
        assert!(sets.sink.is_empty());
    }
}
