use crate::{
    rebalance, select_direction, split_by_flow, Dinic, FlowNetwork, MaxFlowSolver, PartitionError,
    RebalanceConfig, Result, TerminalSetBuilder, Vertex, WeightedGraph, FLOW_EPSILON,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct InertialFlowConfig {
    /// Fraction of a piece's weight each terminal set is grown to.
    pub terminal_fraction: f64,
    /// If set, a piece weighing at most twice the budget grows each terminal
    /// set to at least `weight - max_weight`, so both halves fit the budget
    /// whenever growth reaches its target.
    pub balance_to_budget: bool,
    /// The maximum number of growth rounds per terminal set construction.
    pub max_growth_rounds: u32,
    /// Abort with [`PartitionError::DeadlineExceeded`] once this much time has
    /// passed. Checked between pieces.
    pub deadline: Option<Duration>,
    /// Bisect all pending pieces of a wave concurrently on the rayon pool.
    pub parallel: bool,
    /// Partition only the largest connected component and drop the rest.
    pub largest_component_only: bool,
    /// Run the region rebalancer over the finished partition.
    pub rebalance: Option<RebalanceConfig>,
}

impl Default for InertialFlowConfig {
    fn default() -> Self {
        Self {
            terminal_fraction: 0.25,
            balance_to_budget: true,
            max_growth_rounds: 4096,
            deadline: None,
            parallel: false,
            largest_component_only: true,
            rebalance: None,
        }
    }
}

impl InertialFlowConfig {
    fn validate(&self) -> Result<()> {
        if !(self.terminal_fraction > 0.0 && self.terminal_fraction <= 0.5) {
            return Err(PartitionError::InvalidParameter(format!(
                "terminal fraction {} must lie in (0, 0.5]",
                self.terminal_fraction
            )));
        }
        if self.max_growth_rounds == 0 {
            return Err(PartitionError::InvalidParameter(
                "max_growth_rounds must be positive".to_string(),
            ));
        }
        if let Some(rebalance) = &self.rebalance {
            rebalance.validate()?;
        }
        Ok(())
    }

    /// Target weight of each terminal set for a piece of weight `total`.
    pub fn terminal_target(&self, total: u64, max_weight: u64) -> u64 {
        let target = (self.terminal_fraction * total as f64) as u64;
        if self.balance_to_budget && total <= max_weight.saturating_mul(2) {
            target.max(total.saturating_sub(max_weight))
        } else {
            target
        }
    }
}

/// One finished piece of the partition.
#[derive(Clone, Debug)]
pub struct Region {
    pub vertices: Vec<Vertex>,
    pub weight: u64,
    /// The region is heavier than the budget and could not be split further.
    pub oversized: bool,
}

/// Counters for the recoverable conditions met along the way.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionReport {
    pub bisections: usize,
    /// Terminal growth ended below target.
    pub connectivity_shortfalls: usize,
    /// A flow of zero, or a cut that left one side empty.
    pub degenerate_flows: usize,
    pub oversized_leaves: usize,
    /// Vertices outside the partitioned component.
    pub discarded_vertices: usize,
    /// Regions the rebalancer spread over their neighbours or merged away.
    pub dissolved_regions: usize,
    /// Pairs of adjacent regions the rebalancer cut anew.
    pub resplit_pairs: usize,
}

impl PartitionReport {
    fn merge(&mut self, other: &PartitionReport) {
        self.bisections += other.bisections;
        self.connectivity_shortfalls += other.connectivity_shortfalls;
        self.degenerate_flows += other.degenerate_flows;
        self.oversized_leaves += other.oversized_leaves;
        self.discarded_vertices += other.discarded_vertices;
        self.dissolved_regions += other.dissolved_regions;
        self.resplit_pairs += other.resplit_pairs;
    }
}

#[derive(Clone, Debug, Default)]
pub struct Partition {
    pub regions: Vec<Region>,
    pub report: PartitionReport,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn vertex_sets(&self) -> Vec<HashSet<Vertex>> {
        self.regions
            .iter()
            .map(|r| r.vertices.iter().copied().collect())
            .collect()
    }

    /// Sizes of the smallest and largest region and the average weight.
    pub fn weight_range(&self) -> (u64, u64, f64) {
        let min = self.regions.iter().map(|r| r.weight).min().unwrap_or(0);
        let max = self.regions.iter().map(|r| r.weight).max().unwrap_or(0);
        let total: u64 = self.regions.iter().map(|r| r.weight).sum();
        let avg = if self.regions.is_empty() {
            0.0
        } else {
            total as f64 / self.regions.len() as f64
        };
        (min, max, avg)
    }
}

/// What happened to a piece taken off the work-list.
enum Step {
    Leaf(WeightedGraph),
    Split(WeightedGraph, WeightedGraph),
    Components(Vec<WeightedGraph>),
}

/// Partitions `graph` into regions of at most `max_weight` using the default
/// configuration and Dinic's algorithm.
pub fn partition(graph: &WeightedGraph, max_weight: u64) -> Result<Partition> {
    partition_with(graph, max_weight, &InertialFlowConfig::default(), &Dinic)
}

/// Partitions `graph` by recursive bisection along minimum cuts between
/// terminal sets grown from the ends of its widest projection.
pub fn partition_with<S: MaxFlowSolver + Sync>(
    graph: &WeightedGraph,
    max_weight: u64,
    config: &InertialFlowConfig,
    solver: &S,
) -> Result<Partition> {
    config.validate()?;
    if graph.is_empty() {
        return Err(PartitionError::EmptyGraph);
    }
    if max_weight == 0 {
        return Err(PartitionError::InvalidParameter(
            "max_weight must be positive".to_string(),
        ));
    }

    let start = Instant::now();
    let mut result = Partition::default();
    let mut pending: Vec<WeightedGraph> = if config.largest_component_only {
        let component = graph.largest_connected_component();
        result.report.discarded_vertices = graph.vertex_count() - component.len();
        if result.report.discarded_vertices > 0 {
            log::debug!(
                "dropping {} vertices outside the largest component",
                result.report.discarded_vertices
            );
        }
        vec![graph.induced_subgraph(&component)]
    } else {
        graph
            .connected_components()
            .iter()
            .rev()
            .map(|c| graph.induced_subgraph(c))
            .collect()
    };

    if config.parallel {
        while !pending.is_empty() {
            check_deadline(config, start, pending.len())?;
            let outcomes = std::mem::take(&mut pending)
                .into_par_iter()
                .map(|piece| bisect_step(piece, max_weight, config, solver))
                .collect::<Result<Vec<_>>>()?;
            for outcome in outcomes {
                absorb(outcome, max_weight, &mut result, &mut pending);
            }
        }
    } else {
        while let Some(piece) = pending.pop() {
            check_deadline(config, start, pending.len() + 1)?;
            let outcome = bisect_step(piece, max_weight, config, solver)?;
            absorb(outcome, max_weight, &mut result, &mut pending);
        }
    }

    if config.rebalance.is_some() {
        result = rebalance(graph, result, max_weight, config, solver)?;
    }

    log::debug!(
        "partitioned {} vertices into {} regions with {} bisections in {}ms",
        graph.vertex_count(),
        result.regions.len(),
        result.report.bisections,
        start.elapsed().as_millis()
    );
    Ok(result)
}

impl WeightedGraph {
    /// Splits the graph into regions of at most `max_weight` while keeping the
    /// capacity of the cut edges low.
    pub fn partition_inertial_flow(&self, config: &InertialFlowConfig, max_weight: u64) -> Result<Partition> {
        partition_with(self, max_weight, config, &Dinic)
    }
}

fn check_deadline(config: &InertialFlowConfig, start: Instant, pending: usize) -> Result<()> {
    match config.deadline {
        Some(deadline) if start.elapsed() >= deadline => Err(PartitionError::DeadlineExceeded {
            elapsed: start.elapsed(),
            pending,
        }),
        _ => Ok(()),
    }
}

fn absorb(
    (step, report): (Step, PartitionReport),
    max_weight: u64,
    result: &mut Partition,
    pending: &mut Vec<WeightedGraph>,
) {
    result.report.merge(&report);
    match step {
        Step::Leaf(piece) => {
            let weight = piece.total_weight();
            let oversized = weight > max_weight;
            if oversized {
                result.report.oversized_leaves += 1;
            }
            result.regions.push(Region {
                vertices: piece.vertices().to_vec(),
                weight,
                oversized,
            });
        }
        Step::Split(source_side, sink_side) => {
            pending.push(source_side);
            pending.push(sink_side);
        }
        Step::Components(components) => pending.extend(components.into_iter().rev()),
    }
}

/// Decides the fate of one piece: a leaf if it fits the budget or cannot be
/// split, otherwise its components or the two sides of a minimum cut.
fn bisect_step<S: MaxFlowSolver>(
    piece: WeightedGraph,
    max_weight: u64,
    config: &InertialFlowConfig,
    solver: &S,
) -> Result<(Step, PartitionReport)> {
    let mut report = PartitionReport::default();
    let weight = piece.total_weight();
    if weight <= max_weight {
        return Ok((Step::Leaf(piece), report));
    }
    if piece.vertex_count() == 1 {
        log::warn!(
            "vertex {} weighs {weight}, more than the budget of {max_weight}",
            piece.vertex(0).id
        );
        return Ok((Step::Leaf(piece), report));
    }

    let components = piece.connected_components();
    if components.len() > 1 {
        log::trace!("piece of {} vertices falls apart into {} components", piece.vertex_count(), components.len());
        let parts = components.iter().map(|c| piece.induced_subgraph(c)).collect();
        return Ok((Step::Components(parts), report));
    }

    let projection = select_direction(piece.vertices()).ok_or(PartitionError::EmptyGraph)?;
    let target = config.terminal_target(weight, max_weight);
    let sets = TerminalSetBuilder::new(&piece, target, target).grow(&projection.order, config.max_growth_rounds)?;
    log::trace!(
        "terminals of {} vertices: source {} / sink {} against target {target} after {} rounds",
        piece.vertex_count(),
        sets.source_weight,
        sets.sink_weight,
        sets.rounds
    );
    if sets.source_weight < target || sets.sink_weight < target {
        log::warn!(
            "terminal growth fell short: source {} / sink {} of target {target}",
            sets.source_weight,
            sets.sink_weight
        );
        report.connectivity_shortfalls += 1;
    }
    if sets.source.is_empty() || sets.sink.is_empty() {
        report.degenerate_flows += 1;
        return Ok((Step::Leaf(piece), report));
    }

    let (network, source, sink) = FlowNetwork::augmented(&piece, &sets)?;
    let flow = solver.compute_max_flow(network, source, sink)?;
    if flow.value <= FLOW_EPSILON {
        log::warn!("zero flow between terminals of a {} vertex piece", piece.vertex_count());
        report.degenerate_flows += 1;
    }

    let bisection = split_by_flow(&piece, &flow)?;
    if bisection.source_side.is_empty() || bisection.sink_side.is_empty() {
        log::warn!("cut left one side empty, keeping the piece of weight {weight} whole");
        report.degenerate_flows += 1;
        return Ok((Step::Leaf(piece), report));
    }

    report.bisections += 1;
    Ok((Step::Split(bisection.source_side, bisection.sink_side), report))
}
