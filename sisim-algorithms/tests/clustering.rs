#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]
use nalgebra::Isometry3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sisim_algorithms::{
    ClusteringAlgorithm, NearestNeighbor, NearestNeighborRms, NearestNeighborRmsConfig,
};
use sisim_core::{
    ChannelId, ChargeCarrier, Pixels, RawHit, ReadoutChip, SensorElectrodes, SensorId, Strips,
};
use sisim_digi::{GenericReadoutChip, GenericReadoutConfig};
use std::collections::{BTreeSet, HashSet};

/// Random occupancy: each cell fires with probability `occupancy`.
fn random_hits(n_cells: usize, occupancy: f64, rng: &mut ChaCha8Rng) -> Vec<RawHit> {
    let mut hits = Vec::new();
    for cell in 0..n_cells {
        if !rng.gen_bool(occupancy) {
            continue;
        }
        let channel = ChannelId {
            sensor: SensorId(0),
            side: ChargeCarrier::Hole,
            cell,
        };
        hits.push(RawHit::new(channel, vec![rng.gen_range(1..=128)], 0));
    }
    hits
}

fn chip() -> GenericReadoutChip {
    GenericReadoutChip::new(GenericReadoutConfig::default().with_noise(500.0, 0.0)).unwrap()
}

/// Checks containment, connectivity and maximality of a clustering.
fn check_clusters(
    algo: &dyn ClusteringAlgorithm,
    electrodes: &dyn SensorElectrodes,
    chip: &dyn ReadoutChip,
    hits: &[RawHit],
    neighbor_level: impl Fn(&RawHit) -> bool,
) {
    let clusters = algo.find_clusters(electrodes, chip, hits).unwrap();

    let mut seen = HashSet::new();
    for cluster in &clusters {
        let cells: BTreeSet<usize> = cluster.cells().collect();
        assert_eq!(cells.len(), cluster.len(), "cluster repeats a cell");
        for cell in &cells {
            assert!(seen.insert(*cell), "cell {} in two clusters", cell);
        }
        for hit in cluster.iter() {
            assert!(neighbor_level(hit), "cell {} below neighbor level", hit.cell());
        }

        // Connected: flood fill inside the cluster reaches every cell.
        let start = *cells.iter().next().unwrap();
        let mut reached = BTreeSet::from([start]);
        let mut queue = vec![start];
        while let Some(cell) = queue.pop() {
            for neighbor in electrodes.nearest_neighbor_cells(cell) {
                if cells.contains(&neighbor) && reached.insert(neighbor) {
                    queue.push(neighbor);
                }
            }
        }
        assert_eq!(reached, cells, "cluster is not connected");

        // Maximal: no clusterable hit borders the cluster.
        for cell in &cells {
            for neighbor in electrodes.nearest_neighbor_cells(*cell) {
                if cells.contains(&neighbor) {
                    continue;
                }
                if let Some(hit) = hits.iter().find(|h| h.cell() == neighbor) {
                    assert!(!neighbor_level(hit), "cell {} left out of cluster", neighbor);
                }
            }
        }
    }
}

#[test]
fn test_strip_clusters_contained_and_connected() {
    let electrodes =
        Strips::new(ChargeCarrier::Hole, 400, 0.05, 10.0, Isometry3::identity()).unwrap();
    let chip = chip();
    let algo = NearestNeighbor::default();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for _ in 0..20 {
        let hits = random_hits(400, 0.3, &mut rng);
        check_clusters(&algo, &electrodes, &chip, &hits, |hit| {
            chip.decode_charge(hit).unwrap() >= 2000.0
        });

        // Every seed ends up in a cluster.
        let clusters = algo.find_clusters(&electrodes, &chip, &hits).unwrap();
        let clustered: HashSet<usize> = clusters.iter().flat_map(|c| c.cells()).collect();
        for hit in &hits {
            if chip.decode_charge(hit).unwrap() >= 4000.0 {
                assert!(clustered.contains(&hit.cell()), "seed {} not clustered", hit.cell());
            }
        }
    }
}

#[test]
fn test_pixel_clusters_contained_and_connected() {
    let electrodes =
        Pixels::new(ChargeCarrier::Hole, 30, 30, 0.05, 0.05, Isometry3::identity()).unwrap();
    let chip = chip();
    let algo = NearestNeighbor::default();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for _ in 0..10 {
        let hits = random_hits(900, 0.15, &mut rng);
        check_clusters(&algo, &electrodes, &chip, &hits, |hit| {
            chip.decode_charge(hit).unwrap() >= 2000.0
        });
    }
}

#[test]
fn test_rms_clusters_pass_cluster_threshold() {
    let electrodes =
        Strips::new(ChargeCarrier::Hole, 400, 0.05, 10.0, Isometry3::identity()).unwrap();
    let chip = chip();
    let config = NearestNeighborRmsConfig::default().with_thresholds(8.0, 4.0, 12.0);
    let algo = NearestNeighborRms::new(config).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for _ in 0..20 {
        let hits = random_hits(400, 0.3, &mut rng);
        let clusters = algo.find_clusters(&electrodes, &chip, &hits).unwrap();
        for cluster in &clusters {
            let signal: f64 = cluster.iter().map(|h| chip.decode_charge(h).unwrap()).sum();
            let noise = 500.0 * (cluster.len() as f64).sqrt();
            assert!(signal / noise > 12.0, "cluster significance {}", signal / noise);
        }
    }
}
