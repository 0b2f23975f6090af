use crate::{
    partition_with, InertialFlowConfig, MaxFlowSolver, Partition, PartitionError, Region, Result,
    WeightedGraph,
};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

/// Post-processing of a finished partition: small regions are spread over
/// their neighbours, then small regions are re-cut together with a neighbour
/// until the region weights are even enough.
#[derive(Copy, Clone, Debug)]
pub struct RebalanceConfig {
    /// Regions lighter than this fraction of the budget are candidates for
    /// dissolving and re-cutting.
    pub small_region_fraction: f64,
    /// Re-cutting stops once the variance of the region weights is at most
    /// this fraction of the total weight.
    pub variance_fraction: f64,
    /// The maximum number of re-cuts.
    pub max_rounds: usize,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            small_region_fraction: 0.5,
            variance_fraction: 0.1,
            max_rounds: 1000,
        }
    }
}

impl RebalanceConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.small_region_fraction > 0.0 && self.small_region_fraction <= 1.0) {
            return Err(PartitionError::InvalidParameter(format!(
                "small region fraction {} must lie in (0, 1]",
                self.small_region_fraction
            )));
        }
        if !(self.variance_fraction >= 0.0) {
            return Err(PartitionError::InvalidParameter(format!(
                "variance fraction {} must not be negative",
                self.variance_fraction
            )));
        }
        Ok(())
    }
}

/// Rebalances `partition` of `graph` with the settings in `config.rebalance`,
/// or the defaults if none are set. Re-cuts use the terminal settings of
/// `config` and `solver`.
///
/// Every step either lowers the number of regions or, at a constant count,
/// lowers the variance of the region weights. No region ends up above the
/// budget unless it was a single oversized vertex before.
pub fn rebalance<S: MaxFlowSolver + Sync>(
    graph: &WeightedGraph,
    partition: Partition,
    max_weight: u64,
    config: &InertialFlowConfig,
    solver: &S,
) -> Result<Partition> {
    let settings = config.rebalance.unwrap_or_default();
    settings.validate()?;
    let split_config = InertialFlowConfig {
        deadline: None,
        parallel: false,
        largest_component_only: false,
        rebalance: None,
        ..config.clone()
    };

    let mut balancer = Balancer::new(graph, &partition, max_weight, &settings, split_config, solver)?;
    balancer.run()?;

    let mut report = partition.report;
    report.dissolved_regions += balancer.dissolved;
    report.resplit_pairs += balancer.resplit;
    log::debug!(
        "rebalanced {} regions into {}: {} dissolved, {} pairs re-cut",
        partition.regions.len(),
        balancer.regions.len(),
        balancer.dissolved,
        balancer.resplit
    );
    Ok(Partition {
        regions: balancer.into_regions(),
        report,
    })
}

/// Moving `vertex` out of a dissolving region into `region`, scored by how
/// strongly the vertex is tied to `region` compared to its own region.
struct Move {
    score: f64,
    vertex: usize,
    region: usize,
}

impl Ord for Move {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.vertex.cmp(&self.vertex))
            .then_with(|| other.region.cmp(&self.region))
    }
}

impl PartialOrd for Move {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Move {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Move {}

struct Balancer<'a, S> {
    graph: &'a WeightedGraph,
    max_weight: u64,
    settings: &'a RebalanceConfig,
    split_config: InertialFlowConfig,
    solver: &'a S,
    /// Region of each graph vertex. `None` for vertices the partition dropped.
    region_of: Vec<Option<usize>>,
    regions: Vec<Vec<usize>>,
    weights: Vec<u64>,
    /// Vertex sets of region pairs that were already merged or re-cut.
    merged: HashSet<Vec<usize>>,
    dissolved: usize,
    resplit: usize,
}

impl<'a, S: MaxFlowSolver + Sync> Balancer<'a, S> {
    fn new(
        graph: &'a WeightedGraph,
        partition: &Partition,
        max_weight: u64,
        settings: &'a RebalanceConfig,
        split_config: InertialFlowConfig,
        solver: &'a S,
    ) -> Result<Self> {
        let mut region_of = vec![None; graph.vertex_count()];
        let mut regions = Vec::with_capacity(partition.regions.len());
        for (idx, region) in partition.regions.iter().enumerate() {
            let mut members = Vec::with_capacity(region.vertices.len());
            for v in region.vertices.iter() {
                let vx = graph.index_of(v).ok_or_else(|| {
                    PartitionError::invariant(format!("region vertex {} is not part of the graph", v.id))
                })?;
                if region_of[vx].replace(idx).is_some() {
                    return Err(PartitionError::invariant(format!(
                        "vertex {} belongs to more than one region",
                        v.id
                    )));
                }
                members.push(vx);
            }
            regions.push(members);
        }
        let weights: Vec<u64> = regions
            .iter()
            .map(|members: &Vec<usize>| members.iter().map(|&vx| graph.vertex(vx).weight).sum())
            .collect();

        Ok(Self {
            graph,
            max_weight,
            settings,
            split_config,
            solver,
            region_of,
            regions,
            weights,
            merged: HashSet::new(),
            dissolved: 0,
            resplit: 0,
        })
    }

    fn run(&mut self) -> Result<()> {
        while self.dissolve_small_region() {}

        let threshold = self.settings.variance_fraction * self.weights.iter().sum::<u64>() as f64;
        let mut rounds = 0;
        while rounds < self.settings.max_rounds && self.variance() > threshold {
            if !self.recut_small_region()? {
                break;
            }
            rounds += 1;
        }
        Ok(())
    }

    fn into_regions(self) -> Vec<Region> {
        let graph = self.graph;
        let max_weight = self.max_weight;
        self.regions
            .into_iter()
            .zip(self.weights)
            .map(|(members, weight)| Region {
                vertices: members.iter().map(|&vx| *graph.vertex(vx)).collect(),
                weight,
                oversized: weight > max_weight,
            })
            .collect()
    }

    fn variance(&self) -> f64 {
        if self.weights.is_empty() {
            return 0.0;
        }
        let count = self.weights.len() as f64;
        let mean = self.weights.iter().sum::<u64>() as f64 / count;
        let mean_square = self.weights.iter().map(|&w| (w as f64) * (w as f64)).sum::<f64>() / count;
        mean_square - mean * mean
    }

    /// Regions below the small region threshold, lightest first.
    fn small_regions(&self) -> Vec<usize> {
        let limit = self.settings.small_region_fraction * self.max_weight as f64;
        let mut small: Vec<usize> = (0..self.regions.len())
            .filter(|&r| (self.weights[r] as f64) < limit)
            .collect();
        small.sort_by_key(|&r| (self.weights[r], r));
        small
    }

    /// Regions sharing an edge with `r` that still fit the budget, heaviest
    /// first.
    fn neighbours(&self, r: usize) -> Vec<usize> {
        let adjacent: BTreeSet<usize> = self.regions[r]
            .iter()
            .flat_map(|&vx| self.graph.neighbours(vx))
            .filter_map(|e| self.region_of[e.dst])
            .filter(|&n| n != r && self.weights[n] <= self.max_weight)
            .collect();
        let mut adjacent: Vec<usize> = adjacent.into_iter().collect();
        adjacent.sort_by_key(|&n| (Reverse(self.weights[n]), n));
        adjacent
    }

    fn assign(&mut self, r: usize, members: Vec<usize>) {
        for &vx in members.iter() {
            self.region_of[vx] = Some(r);
        }
        self.weights[r] = members.iter().map(|&vx| self.graph.vertex(vx).weight).sum();
        self.regions[r] = members;
    }

    /// Drops region `r`, which must have no members left.
    fn remove_region(&mut self, r: usize) {
        self.regions.swap_remove(r);
        self.weights.swap_remove(r);
        if r < self.regions.len() {
            for &vx in self.regions[r].iter() {
                self.region_of[vx] = Some(r);
            }
        }
    }

    /// Spreads the lightest small region that fits into the spare budget of
    /// its neighbours over them.
    fn dissolve_small_region(&mut self) -> bool {
        for r in self.small_regions() {
            let neighbours = self.neighbours(r);
            let available: u64 = neighbours.iter().map(|&n| self.max_weight - self.weights[n]).sum();
            if neighbours.is_empty() || available < self.weights[r] {
                continue;
            }
            let Some(moves) = self.redistribute(r, &neighbours) else {
                continue;
            };

            log::trace!(
                "dissolving region of weight {} into {} neighbours",
                self.weights[r],
                neighbours.len()
            );
            for (vx, n) in moves {
                self.region_of[vx] = Some(n);
                self.regions[n].push(vx);
                self.weights[n] += self.graph.vertex(vx).weight;
            }
            self.regions[r].clear();
            self.remove_region(r);
            self.dissolved += 1;
            return true;
        }
        false
    }

    /// Plans moving every vertex of `r` into one of `neighbours` without
    /// pushing any of them over the budget. Vertices move along edges only,
    /// so each neighbour stays connected.
    fn redistribute(&self, r: usize, neighbours: &[usize]) -> Option<Vec<(usize, usize)>> {
        let members = &self.regions[r];
        let mut load: HashMap<usize, u64> = neighbours.iter().map(|&n| (n, self.weights[n])).collect();
        let mut moved: HashMap<usize, usize> = HashMap::new();
        let mut heap = BinaryHeap::new();
        for &vx in members.iter() {
            for &n in neighbours.iter() {
                heap.extend(self.score(vx, r, n, load[&n], &moved));
            }
        }

        while let Some(Move { vertex, region, .. }) = heap.pop() {
            if moved.contains_key(&vertex) {
                continue;
            }
            let weight = self.graph.vertex(vertex).weight;
            let Some(current) = load.get_mut(&region) else {
                continue;
            };
            if *current + weight > self.max_weight {
                continue;
            }
            *current += weight;
            let region_load = *current;
            moved.insert(vertex, region);
            for e in self.graph.neighbours(vertex) {
                if self.region_of[e.dst] == Some(r) && !moved.contains_key(&e.dst) {
                    heap.extend(self.score(e.dst, r, region, region_load, &moved));
                }
            }
        }

        if moved.len() != members.len() {
            return None;
        }
        let mut moves: Vec<(usize, usize)> = moved.into_iter().collect();
        moves.sort_unstable();
        Some(moves)
    }

    /// Capacity from `vx` into `n` against the capacity it keeps inside its
    /// own region, scaled by how much room `n` has. `None` if `vx` does not
    /// touch `n`.
    fn score(&self, vx: usize, r: usize, n: usize, load: u64, moved: &HashMap<usize, usize>) -> Option<Move> {
        let mut outer = 0.0;
        let mut inner = 0.0;
        let mut touches = false;
        for e in self.graph.neighbours(vx) {
            let owner = moved.get(&e.dst).copied().or(self.region_of[e.dst]);
            if owner == Some(n) {
                touches = true;
                outer += e.capacity;
            } else if owner == Some(r) {
                inner += e.capacity;
            }
        }
        if !touches {
            return None;
        }
        let room = self.max_weight as f64 / load.max(1) as f64;
        let score = if inner > 0.0 { outer / inner * room } else { outer * room };
        Some(Move {
            score,
            vertex: vx,
            region: n,
        })
    }

    /// Merges or re-cuts the lightest small region together with one of its
    /// neighbours. A re-cut is taken only if it evens out the pair and does
    /// not make the cut between them much heavier.
    fn recut_small_region(&mut self) -> Result<bool> {
        let half = self.settings.small_region_fraction * self.max_weight as f64;
        for s in self.small_regions() {
            let small_weight = self.weights[s];
            let mut best: Option<(usize, Vec<usize>, Vec<Vec<usize>>)> = None;
            let mut best_diff = u64::MAX;
            let mut best_min = small_weight;

            for n in self.neighbours(s) {
                let mut union: Vec<usize> = self.regions[s].iter().chain(self.regions[n].iter()).copied().collect();
                union.sort_unstable();
                if self.merged.contains(&union) {
                    continue;
                }

                if small_weight + self.weights[n] <= self.max_weight {
                    log::trace!("merging regions of weight {small_weight} and {}", self.weights[n]);
                    self.assign(n, union.clone());
                    self.merged.insert(union);
                    self.regions[s].clear();
                    self.remove_region(s);
                    self.dissolved += 1;
                    return Ok(true);
                }

                let sub = self.graph.induced_subgraph(&union);
                let parts = partition_with(&sub, self.max_weight, &self.split_config, self.solver)?;
                if parts.len() != 2 || parts.regions.iter().any(|region| region.oversized) {
                    continue;
                }

                let (w1, w2) = (parts.regions[0].weight, parts.regions[1].weight);
                let (low, high) = (w1.min(w2), w1.max(w2));
                let diff = high - low;
                if diff >= small_weight.abs_diff(self.weights[n]) {
                    continue;
                }

                let mut in_first = vec![false; sub.vertex_count()];
                let mut sides = Vec::with_capacity(2);
                for (i, region) in parts.regions.iter().enumerate() {
                    let mut side = Vec::with_capacity(region.vertices.len());
                    for v in region.vertices.iter() {
                        let idx = sub
                            .index_of(v)
                            .ok_or_else(|| PartitionError::invariant(format!("re-cut lost vertex {}", v.id)))?;
                        in_first[idx] = i == 0;
                        side.push(union[idx]);
                    }
                    sides.push(side);
                }
                let cut_before: f64 = sub
                    .edges()
                    .filter(|(a, b, _)| {
                        (self.region_of[union[*a]] == Some(s)) != (self.region_of[union[*b]] == Some(s))
                    })
                    .map(|(_, _, e)| e.capacity)
                    .sum();
                let cut_after: f64 = sub
                    .edges()
                    .filter(|(a, b, _)| in_first[*a] != in_first[*b])
                    .map(|(_, _, e)| e.capacity)
                    .sum();

                let fills_small = (small_weight as f64) < half && low as f64 >= half;
                let allowance = if fills_small { 1.5 } else { 1.0 };
                if cut_after > cut_before * allowance {
                    continue;
                }
                if fills_small && low > best_min {
                    best_min = low;
                    best = Some((n, union, sides));
                } else if diff < best_diff {
                    best_diff = diff;
                    best = Some((n, union, sides));
                }
            }

            if let Some((n, union, mut sides)) = best {
                log::trace!(
                    "re-cutting regions of weight {small_weight} and {}",
                    self.weights[n]
                );
                let second = sides.pop().unwrap_or_default();
                let first = sides.pop().unwrap_or_default();
                self.assign(s, first);
                self.assign(n, second);
                self.merged.insert(union);
                self.resplit += 1;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
