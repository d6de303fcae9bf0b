//! Unit tests for band partitioning
//!
//! Tests coverage, determinism, remainder handling and edge cases.

use lifegrid_core::broker::BandPartitioner;
use lifegrid_core::Band;

#[test]
fn test_bands_cover_every_row_once() {
    for height in 3..40 {
        for workers in 1..=height.min(7) {
            let bands = BandPartitioner::new(height, workers).unwrap().bands();
            assert_eq!(bands.len(), workers);
            assert_eq!(bands[0].start_y, 0);
            assert_eq!(bands.last().unwrap().end_y, height);
            for pair in bands.windows(2) {
                assert_eq!(pair[0].end_y, pair[1].start_y, "gap or overlap at {:?}", pair);
            }
            assert!(bands.iter().all(|b| !b.is_empty()));
        }
    }
}

#[test]
fn test_last_band_takes_remainder() {
    let bands = BandPartitioner::new(16, 3).unwrap().bands();
    assert_eq!(bands, vec![Band::new(0, 5), Band::new(5, 10), Band::new(10, 16)]);
}

#[test]
fn test_single_worker_gets_whole_board() {
    let bands = BandPartitioner::new(9, 1).unwrap().bands();
    assert_eq!(bands, vec![Band::new(0, 9)]);
}

#[test]
fn test_deterministic_partition() {
    let a = BandPartitioner::new(512, 3).unwrap();
    let b = BandPartitioner::new(512, 3).unwrap();
    assert_eq!(a.bands(), b.bands(), "Partition should be deterministic");
}

#[test]
fn test_band_lookup_agrees_with_bands() {
    let partitioner = BandPartitioner::new(23, 4).unwrap();
    let bands = partitioner.bands();

    for (worker, band) in bands.iter().enumerate() {
        assert_eq!(partitioner.band_for_worker(worker), Some(*band));
        for row in band.start_y..band.end_y {
            assert_eq!(partitioner.band_owner(row), Some(worker), "row {}", row);
        }
    }
    assert_eq!(partitioner.band_for_worker(4), None);
    assert_eq!(partitioner.band_owner(23), None);
}

#[test]
fn test_rejects_more_workers_than_rows() {
    assert!(BandPartitioner::new(2, 3).unwrap_err().is_validation());
    assert!(BandPartitioner::new(10, 0).is_err());
    assert!(BandPartitioner::new(3, 3).is_ok());
}
