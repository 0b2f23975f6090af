use crate::{divide_round_up, Partition, WeightedGraph};

/// Quality figures of a finished partition.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionStats {
    pub region_count: usize,
    /// Lower bound on the number of regions any partition under the budget needs.
    pub min_region_count_estimate: u64,
    pub total_weight: u64,
    pub average_weight: f64,
    pub min_weight: u64,
    pub max_weight: u64,
    /// Mean of squared region weights minus the squared mean.
    pub weight_variance: f64,
    /// Per region, the capacity of the edges leaving it.
    pub cut_weights: Vec<f64>,
    /// Capacity of all edges whose endpoints lie in different regions, each
    /// edge counted once.
    pub total_cut_weight: f64,
}

impl PartitionStats {
    pub fn compute(graph: &WeightedGraph, partition: &Partition, max_weight: u64) -> Self {
        let mut region_of = vec![usize::MAX; graph.vertex_count()];
        for (region, r) in partition.regions.iter().enumerate() {
            for v in r.vertices.iter() {
                if let Some(idx) = graph.index_of(v) {
                    region_of[idx] = region;
                }
            }
        }

        let mut cut_weights = vec![0.0; partition.regions.len()];
        let mut total_cut_weight = 0.0;
        for (a, b, e) in graph.edges() {
            let (ra, rb) = (region_of[a], region_of[b]);
            if ra == rb {
                continue;
            }
            total_cut_weight += e.capacity;
            for r in [ra, rb] {
                if r != usize::MAX {
                    cut_weights[r] += e.capacity;
                }
            }
        }

        let weights: Vec<u64> = partition.regions.iter().map(|r| r.weight).collect();
        let total_weight: u64 = weights.iter().sum();
        let count = weights.len().max(1) as f64;
        let average_weight = total_weight as f64 / count;
        let mean_square = weights.iter().map(|&w| (w as f64) * (w as f64)).sum::<f64>() / count;

        Self {
            region_count: partition.regions.len(),
            min_region_count_estimate: divide_round_up(graph.total_weight(), max_weight),
            total_weight,
            average_weight,
            min_weight: weights.iter().copied().min().unwrap_or(0),
            max_weight: weights.iter().copied().max().unwrap_or(0),
            weight_variance: mean_square - average_weight * average_weight,
            cut_weights,
            total_cut_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_util::*;
    use crate::partition;

    #[test]
    fn path_cut_and_weights() {
        let graph = path_graph(4, 3.0);
        let partition = partition(&graph, 2).unwrap();
        let stats = PartitionStats::compute(&graph, &partition, 2);

        assert_eq!(stats.region_count, 2);
        assert_eq!(stats.min_region_count_estimate, 2);
        assert_eq!(stats.total_weight, 4);
        assert_eq!(stats.average_weight, 2.0);
        assert_eq!(stats.weight_variance, 0.0);
        assert_eq!(stats.total_cut_weight, 3.0);
        assert_eq!(stats.cut_weights, vec![3.0, 3.0]);
    }

    #[test]
    fn region_cuts_count_each_edge_from_both_sides() {
        let graph = grid_graph(6, 5, 2.0);
        let partition = partition(&graph, 7).unwrap();
        let stats = PartitionStats::compute(&graph, &partition, 7);

        assert_eq!(stats.total_weight, 30);
        assert_eq!(stats.min_region_count_estimate, 5);
        assert!(stats.region_count >= 5);
        assert!(stats.max_weight <= 7);
        let summed: f64 = stats.cut_weights.iter().sum();
        assert_eq!(summed, 2.0 * stats.total_cut_weight);
        assert!(stats.weight_variance >= 0.0);
    }
}
