use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::ops::Range;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A located, weighted vertex.
///
/// Two vertices are the same vertex if both their id and their coordinate
/// match, with `-0.0` and `0.0` the same coordinate. The weight does not take
/// part in identity.
#[derive(Copy, Clone, Debug)]
pub struct Vertex {
    pub id: u64,
    pub point: Point,
    pub weight: u64,
}

impl Vertex {
    pub fn new(id: u64, x: f64, y: f64, weight: u64) -> Self {
        Self {
            id,
            point: Point::new(x, y),
            weight,
        }
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && coordinate_bits(self.point.x) == coordinate_bits(other.point.x)
            && coordinate_bits(self.point.y) == coordinate_bits(other.point.y)
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        coordinate_bits(self.point.x).hash(state);
        coordinate_bits(self.point.y).hash(state);
    }
}

// Adding 0.0 turns -0.0 into 0.0 and leaves every other value alone.
fn coordinate_bits(c: f64) -> u64 {
    (c + 0.0).to_bits()
}

/// One direction of an undirected edge. Both directions carry the same
/// length and capacity.
#[derive(Copy, Clone, Debug)]
pub struct GraphEdge {
    pub dst: usize,
    pub length: f64,
    pub capacity: f64,
}

/// Undirected graph over located, weighted vertices.
///
/// Vertices are addressed by their insertion index. Vertices are added lazily
/// when an edge references them.
#[derive(Clone, Debug, Default)]
pub struct WeightedGraph {
    vertices: Vec<Vertex>,
    adjacency: Vec<Vec<GraphEdge>>,
    lookup: HashMap<Vertex, usize>,
}

impl WeightedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex if it is not present yet and returns its index.
    ///
    /// A vertex that is already present keeps its stored weight, even if `v`
    /// carries a different one.
    pub fn add_vertex(&mut self, v: Vertex) -> usize {
        if let Some(&idx) = self.lookup.get(&v) {
            if self.vertices[idx].weight != v.weight {
                log::trace!(
                    "vertex {} already present with weight {}, ignoring weight {}",
                    v.id,
                    self.vertices[idx].weight,
                    v.weight
                );
            }
            return idx;
        }
        let idx = self.vertices.len();
        self.vertices.push(v);
        self.adjacency.push(Vec::new());
        self.lookup.insert(v, idx);
        idx
    }

    /// Adds an undirected edge whose capacity equals its length.
    pub fn add_edge(&mut self, a: Vertex, b: Vertex, length: f64) {
        self.add_edge_with_capacity(a, b, length, length);
    }

    /// Adds an undirected edge, replacing an existing one between the same
    /// endpoints. Self-loops never cross a cut and are ignored.
    pub fn add_edge_with_capacity(&mut self, a: Vertex, b: Vertex, length: f64, capacity: f64) {
        let ia = self.add_vertex(a);
        let ib = self.add_vertex(b);
        if ia == ib {
            log::trace!("ignoring self-loop on vertex {}", a.id);
            return;
        }
        self.insert_half(ia, ib, length, capacity);
        self.insert_half(ib, ia, length, capacity);
    }

    fn insert_half(&mut self, src: usize, dst: usize, length: f64, capacity: f64) {
        let edges = &mut self.adjacency[src];
        match edges.iter_mut().find(|e| e.dst == dst) {
            Some(e) => {
                e.length = length;
                e.capacity = capacity;
            }
            None => edges.push(GraphEdge {
                dst,
                length,
                capacity,
            }),
        }
    }

    /// Removes the edge between two vertices in both directions.
    pub fn remove_edge(&mut self, a: &Vertex, b: &Vertex) -> bool {
        let (Some(ia), Some(ib)) = (self.index_of(a), self.index_of(b)) else {
            return false;
        };
        let before = self.adjacency[ia].len();
        self.adjacency[ia].retain(|e| e.dst != ib);
        self.adjacency[ib].retain(|e| e.dst != ia);
        self.adjacency[ia].len() != before
    }

    /// Removes a vertex and every edge incident to it. Remaining vertices keep
    /// their relative order but indices above the removed one shift down.
    pub fn remove_vertex(&mut self, v: &Vertex) -> bool {
        let Some(removed) = self.index_of(v) else {
            return false;
        };
        let keep: Vec<usize> = (0..self.vertices.len()).filter(|&i| i != removed).collect();
        *self = self.induced_subgraph(&keep);
        true
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|edges| edges.len()).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertex(&self, idx: usize) -> &Vertex {
        &self.vertices[idx]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn index_of(&self, v: &Vertex) -> Option<usize> {
        self.lookup.get(v).copied()
    }

    pub fn neighbours(&self, idx: usize) -> &[GraphEdge] {
        &self.adjacency[idx]
    }

    /// Iterates every undirected edge once as `(a, b, edge)` with `a < b`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, &GraphEdge)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(src, edges)| {
            edges
                .iter()
                .filter(move |e| src < e.dst)
                .map(move |e| (src, e.dst, e))
        })
    }

    pub fn total_weight(&self) -> u64 {
        self.vertices.iter().map(|v| v.weight).sum()
    }

    /// Builds the subgraph induced by the given vertex indices. Vertices keep
    /// the order in which they are listed; edges leaving the set are dropped.
    pub fn induced_subgraph(&self, members: &[usize]) -> WeightedGraph {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut sub = WeightedGraph {
            vertices: Vec::with_capacity(members.len()),
            adjacency: Vec::with_capacity(members.len()),
            lookup: HashMap::with_capacity(members.len()),
        };
        for &old in members {
            if remap[old] == usize::MAX {
                remap[old] = sub.add_vertex(self.vertices[old]);
            }
        }
        for &old in members {
            let new = remap[old];
            if !sub.adjacency[new].is_empty() {
                continue;
            }
            sub.adjacency[new] = self.adjacency[old]
                .iter()
                .filter(|e| remap[e.dst] != usize::MAX)
                .map(|e| GraphEdge {
                    dst: remap[e.dst],
                    ..*e
                })
                .collect();
        }
        sub
    }

    /// Splits the vertex set into connected components. Each component lists
    /// its vertices in ascending index order, components are ordered by their
    /// lowest index.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut component = vec![usize::MAX; self.vertices.len()];
        let mut components = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..self.vertices.len() {
            if component[start] != usize::MAX {
                continue;
            }
            let id = components.len();
            let mut members = vec![start];
            component[start] = id;
            queue.push_back(start);
            while let Some(vx) = queue.pop_front() {
                for e in self.adjacency[vx].iter() {
                    if component[e.dst] == usize::MAX {
                        component[e.dst] = id;
                        members.push(e.dst);
                        queue.push_back(e.dst);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }

    /// Returns the vertex indices of the component with the most vertices.
    /// Ties go to the component containing the lowest index.
    pub fn largest_connected_component(&self) -> Vec<usize> {
        self.connected_components()
            .into_iter()
            .enumerate()
            .max_by_key(|(i, c)| (c.len(), Reverse(*i)))
            .map(|(_, c)| c)
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_components().len() <= 1
    }

    /// Overwrites every vertex weight with a seeded random value.
    pub fn assign_random_weights(&mut self, rng_seed: u64, range: Range<u64>) {
        let mut rng = StdRng::seed_from_u64(rng_seed);
        for v in self.vertices.iter_mut() {
            v.weight = rng.gen_range(range.clone());
        }
        // Weight is not part of identity, so the lookup stays valid.
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;

    #[test]
    fn edges_are_added_in_both_directions() {
        let mut graph = WeightedGraph::new();
        let a = Vertex::new(1, 0.0, 0.0, 1);
        let b = Vertex::new(2, 3.0, 4.0, 1);
        graph.add_edge(a, b, a.point.distance(&b.point));

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbours(0)[0].dst, 1);
        assert_eq!(graph.neighbours(1)[0].dst, 0);
        assert_eq!(graph.neighbours(1)[0].capacity, 5.0);
    }

    #[test]
    fn identity_uses_id_and_coordinate() {
        let mut graph = WeightedGraph::new();
        let a = graph.add_vertex(Vertex::new(1, 0.0, 0.0, 5));
        let same = graph.add_vertex(Vertex::new(1, 0.0, 0.0, 9));
        let moved = graph.add_vertex(Vertex::new(1, 1.0, 0.0, 5));
        assert_eq!(a, same);
        assert_ne!(a, moved);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.vertex(a).weight, 5);
    }

    #[test]
    fn signed_zero_is_one_coordinate() {
        let a = Vertex::new(1, 0.0, 0.0, 1);
        let a_neg = Vertex::new(1, -0.0, 0.0, 1);
        assert_eq!(a, a_neg);

        let mut graph = WeightedGraph::new();
        graph.add_edge(a, Vertex::new(2, 1.0, 0.0, 1), 1.0);
        graph.add_edge(a_neg, Vertex::new(3, 0.0, 1.0, 1), 1.0);
        assert_eq!(graph.vertex_count(), 3);
        assert!(graph.is_connected());
        assert_eq!(graph.index_of(&a_neg), Some(0));

        let partition = crate::partition(&graph, 10).unwrap();
        assert_eq!(partition.report.discarded_vertices, 0);
        assert_eq!(partition.regions[0].vertices.len(), 3);
    }

    #[test]
    fn removing_a_vertex_drops_incident_edges() {
        let mut graph = grid_graph(3, 3, 1.0);
        assert_eq!(graph.edge_count(), 12);
        let centre = *graph.vertex(4);
        assert!(graph.remove_vertex(&centre));
        assert_eq!(graph.vertex_count(), 8);
        assert_eq!(graph.edge_count(), 8);
        assert!(graph.index_of(&centre).is_none());
        assert!(graph.is_connected());
    }

    #[test]
    fn induced_subgraph_keeps_inner_edges_only() {
        let graph = grid_graph(3, 3, 1.0);
        let sub = graph.induced_subgraph(&[0, 1, 2]);
        assert_eq!(sub.vertex_count(), 3);
        assert_eq!(sub.edge_count(), 2);
        assert_eq!(sub.total_weight(), 3);
    }

    #[test]
    fn largest_component_is_selected() {
        let mut graph = path_graph(4, 1.0);
        let a = Vertex::new(10, 10.0, 10.0, 1);
        let b = Vertex::new(11, 11.0, 10.0, 1);
        graph.add_edge(a, b, 1.0);

        assert_eq!(graph.connected_components().len(), 2);
        assert_eq!(graph.largest_connected_component(), vec![0, 1, 2, 3]);
        assert!(!graph.is_connected());
    }

    #[test]
    fn random_weights_are_seeded() {
        let mut g1 = grid_graph(4, 4, 1.0);
        let mut g2 = grid_graph(4, 4, 1.0);
        g1.assign_random_weights(15, 10..40);
        g2.assign_random_weights(15, 10..40);
        let w1: Vec<u64> = g1.vertices().iter().map(|v| v.weight).collect();
        let w2: Vec<u64> = g2.vertices().iter().map(|v| v.weight).collect();
        assert_eq!(w1, w2);
        assert!(w1.iter().all(|w| (10..40).contains(w)));
        assert_eq!(g1.index_of(&Vertex::new(5, 1.0, 1.0, 0)), Some(5));
    }
}
