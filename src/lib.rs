// Balanced graph partitioning by recursive inertial flow bisection, after
// Schild & Sommer, "On Balanced Separators in Road Networks".

mod balancer;
mod direction;
mod error;
mod flow;
mod graph;
mod inertial_flow;
mod split;
mod stats;
mod terminals;

pub use balancer::{rebalance, RebalanceConfig};
pub use direction::{select_direction, Direction, Projection};
pub use error::{PartitionError, Result};
pub use flow::{Dinic, FlowArc, FlowNetwork, FlowResult, MaxFlowSolver, FLOW_EPSILON, UNBOUNDED};
pub use graph::{GraphEdge, Point, Vertex, WeightedGraph};
pub use inertial_flow::{
    partition, partition_with, InertialFlowConfig, Partition, PartitionReport, Region,
};
pub use split::{split_by_flow, Bisection};
pub use stats::PartitionStats;
pub use terminals::{Side, TerminalSetBuilder, TerminalSets};

pub(crate) fn divide_round_up(a: u64, b: u64) -> u64 {
    if b == 0 {
        return 0;
    }
    (a + b - 1) / b
}
