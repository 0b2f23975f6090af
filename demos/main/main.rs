use inertial_partition::{InertialFlowConfig, PartitionStats, RebalanceConfig, Vertex, WeightedGraph};
use std::time;

fn main() {
    env_logger::init();

    let (w, h) = (120u64, 80u64);
    let mut graph = WeightedGraph::new();
    let at = |x: u64, y: u64| Vertex::new(y * w + x, x as f64 * 10.0, y as f64 * 10.0, 1);
    for y in 0..h {
        for x in 0..w {
            if x + 1 < w {
                graph.add_edge(at(x, y), at(x + 1, y), 10.0);
            }
            if y + 1 < h {
                graph.add_edge(at(x, y), at(x, y + 1), 10.0);
            }
        }
    }
    graph.assign_random_weights(15, 10..40);

    let max_weight = 5000;
    let t1 = time::Instant::now();
    let partition = match graph.partition_inertial_flow(
        &InertialFlowConfig {
            parallel: true,
            rebalance: Some(RebalanceConfig::default()),
            ..Default::default()
        },
        max_weight,
    ) {
        Ok(partition) => partition,
        Err(err) => {
            eprintln!("partitioning failed: {err}");
            std::process::exit(1);
        }
    };
    println!("time: {}ms", t1.elapsed().as_millis());

    let size_info = partition.weight_range();
    println!(
        "partitions: {}, with weights from {} to {} with an average of {}",
        partition.len(),
        size_info.0,
        size_info.1,
        size_info.2
    );

    let stats = PartitionStats::compute(&graph, &partition, max_weight);
    println!(
        "lower bound: {}, weight variance: {:.1}, total cut: {}",
        stats.min_region_count_estimate, stats.weight_variance, stats.total_cut_weight
    );
    println!("{:?}", partition.report);
}
