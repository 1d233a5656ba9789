use ndarray::{Array4, Axis};
use ondine::core::sampler::extract_patch;
use ondine::{Augmentation, CityRecord, Dataset, Mask, PatchSampler, TileCoordinate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

const SIZE: usize = 12;

/// City whose images and label carry a single marker at `(row, col)`
fn marked_city(row: usize, col: usize) -> CityRecord {
    let mut images = Array4::<f32>::zeros((3, 2, 30, 30));
    let mut label = Mask::zeros((30, 30));
    for b in 0..3 {
        for d in 0..2 {
            images[[b, d, row, col]] = 1.0;
        }
    }
    label[[row, col]] = 1;
    CityRecord::new("paris", images, label).unwrap()
}

fn marker_position(values: impl Iterator<Item = ((usize, usize), bool)>) -> Vec<(usize, usize)> {
    values.filter(|(_, marked)| *marked).map(|(pos, _)| pos).collect()
}

#[test]
fn test_every_transform_keeps_label_aligned() {
    let record = marked_city(7, 9);
    let tile = TileCoordinate::new("paris", 5, 6);
    let patch = extract_patch(&record, &tile, SIZE).unwrap();

    for augmentation in Augmentation::all() {
        let out = patch.augmented(&augmentation);
        let label_pos = marker_position(out.label.indexed_iter().map(|(p, &v)| (p, v == 1)));
        assert_eq!(label_pos.len(), 1, "{:?}", augmentation);

        for b in 0..3 {
            for d in 0..2 {
                let image = out.images.index_axis(Axis(0), b);
                let image = image.index_axis(Axis(0), d);
                let image_pos = marker_position(image.indexed_iter().map(|(p, &v)| (p, v == 1.0)));
                assert_eq!(image_pos, label_pos, "{:?} band {} date {}", augmentation, b, d);
            }
        }
    }
}

#[test]
fn test_distinct_transforms_move_the_marker() {
    let record = marked_city(6, 8);
    let patch = extract_patch(&record, &TileCoordinate::new("paris", 5, 6), SIZE).unwrap();

    let positions: std::collections::HashSet<_> = Augmentation::all()
        .iter()
        .map(|aug| {
            let out = patch.augmented(aug);
            marker_position(out.label.indexed_iter().map(|(p, &v)| (p, v == 1)))[0]
        })
        .collect();

    // an off-centre marker lands on each of the 8 dihedral positions
    assert_eq!(positions.len(), 8);
}

#[test]
fn test_sampler_pairs_stay_aligned_under_random_augmentation() {
    let dataset = Arc::new(Dataset::from_records(vec![marked_city(14, 3)]));
    let tiles = vec![
        TileCoordinate::new("paris", 0, 0),
        TileCoordinate::new("paris", 10, 0),
    ];
    let sampler = PatchSampler::new(dataset, tiles, SIZE, true, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);

    for _ in 0..32 {
        for index in 0..sampler.len() {
            let pair = sampler.get_pair(index, &mut rng).unwrap();
            let label_pos = marker_position(pair.label.indexed_iter().map(|(p, &v)| (p, v == 1)));
            for date in [&pair.before, &pair.after] {
                for band in date.axis_iter(Axis(0)) {
                    let image_pos = marker_position(band.indexed_iter().map(|(p, &v)| (p, v == 1.0)));
                    assert_eq!(image_pos, label_pos);
                }
            }
        }
    }
}
