use ndarray::{s, Array2};
use ondine::core::tiling::tile_origins;
use ondine::io::layout::find_band_prefix;
use ondine::{
    BandConfig, DatasetBuilder, DatasetLayout, PrepConfig, PrepError, PrepResult, Raster,
    RasterSource, StretchPolicy, TilingParams,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const BANDS: [&str; 2] = ["B02", "B03"];

/// Serves rasters from memory; the files on disk only drive layout discovery
struct MemorySource {
    bands: HashMap<PathBuf, Raster>,
    masks: HashMap<PathBuf, Array2<u8>>,
}

impl RasterSource for MemorySource {
    fn read_band(&self, path: &Path) -> PrepResult<Raster> {
        self.bands.get(path).cloned().ok_or_else(|| {
            PrepError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))
        })
    }

    fn read_mask(&self, path: &Path) -> PrepResult<Array2<u8>> {
        self.masks.get(path).cloned().ok_or_else(|| {
            PrepError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.display().to_string(),
            ))
        })
    }
}

struct Fixture {
    dir: TempDir,
    source: MemorySource,
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

/// Three cities with two dates each; band rasters are coarser than the masks
fn fixture(cities: &[(&str, usize, usize)]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let mut source = MemorySource {
        bands: HashMap::new(),
        masks: HashMap::new(),
    };

    touch(&root.join("train_labels").join("readme.txt"));

    for (n, (city, h, w)) in cities.iter().enumerate() {
        let label_path = root.join("train_labels").join(city).join("cm").join("cm.png");
        touch(&label_path);
        let mask = Array2::from_shape_fn((*h, *w), |(i, j)| if i < h / 2 && j < w / 2 { 255u8 } else { 0 });
        source.masks.insert(label_path, mask);

        for date in 1..=2 {
            let date_dir = root.join("images").join(city).join(format!("imgs_{}", date));
            for band in BANDS {
                let path = date_dir.join(format!("S2A_{}_{}.tif", city, band));
                touch(&path);
                let raster = Raster::from_shape_fn((h / 2, w / 2), |(i, j)| {
                    ((i * 31 + j * 17 + n * 7) % 97) as f32 * 50.0 * date as f32
                });
                source.bands.insert(path, raster);
            }
        }
    }

    Fixture { dir, source }
}

fn config(root: &Path, val_cities: &str) -> PrepConfig {
    let mut config = PrepConfig::new(root, val_cities);
    config.bands = BandConfig::default().with_bands(&BANDS).unwrap();
    config.tiling = TilingParams { patch_size: 16, stride: 8 };
    config.max_workers = Some(4);
    config
}

const CITIES: [(&str, usize, usize); 3] = [("paris", 40, 48), ("abudhabi", 40, 40), ("rennes", 50, 40)];

#[test]
fn test_layout_discovery() {
    let fixture = fixture(&CITIES);
    let layout = DatasetLayout::new(fixture.dir.path());
    assert_eq!(layout.cities().unwrap(), vec!["abudhabi", "paris", "rennes"]);

    let dir = fixture.dir.path().join("images").join("paris").join("imgs_2");
    let prefix = find_band_prefix(&dir, &BANDS).unwrap();
    assert_eq!(prefix.band_path("B03"), dir.join("S2A_paris_B03.tif"));

    let empty = tempfile::tempdir().unwrap();
    assert!(find_band_prefix(empty.path(), &BANDS).is_err());
}

#[test]
fn test_build_dataset_matches_label_resolution() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fixture = fixture(&CITIES);
    let builder = DatasetBuilder::with_source(config(fixture.dir.path(), "1"), fixture.source).unwrap();
    let dataset = builder.build().unwrap();

    assert_eq!(dataset.len(), 3);
    for (city, h, w) in CITIES {
        let record = dataset.city(city).unwrap();
        assert_eq!(record.images.dim(), (2, 2, h, w));
        assert_eq!(record.label.dim(), (h, w));
        assert!(record.label.iter().all(|&v| v <= 1));
        assert_eq!(record.label[[0, 0]], 1);
        assert!(record.images.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn test_second_date_is_matched_to_first() {
    let fixture = fixture(&[("paris", 40, 48), ("rennes", 40, 40)]);
    let builder = DatasetBuilder::with_source(config(fixture.dir.path(), "0"), fixture.source).unwrap();
    let dataset = builder.build().unwrap();

    // date 2 is date 1 scaled by two, so matching restores the reference exactly
    let record = dataset.city("rennes").unwrap();
    for b in 0..2 {
        let first = record.images.slice(s![b, 0, .., ..]);
        let second = record.images.slice(s![b, 1, .., ..]);
        for (a, c) in first.iter().zip(second.iter()) {
            assert!((a - c).abs() < 1e-6);
        }
    }
}

#[test]
fn test_prepare_samplers_lengths() {
    let fixture = fixture(&CITIES);
    let builder = DatasetBuilder::with_source(config(fixture.dir.path(), "1"), fixture.source).unwrap();
    let samplers = builder.prepare_samplers().unwrap();

    // city index 1 is "paris" once sorted
    let expected_train = tile_origins(40, 40, 16, 8).len() + tile_origins(50, 40, 16, 8).len();
    let expected_val = tile_origins(40, 48, 16, 16).len();
    assert_eq!(samplers.train.len(), expected_train);
    assert_eq!(samplers.val.len(), expected_val);
    assert!(samplers.val.tiles().iter().all(|t| t.city_id == "paris"));
    assert!(samplers.train.augments());
    assert!(!samplers.val.augments());

    let mut rng = StdRng::seed_from_u64(0);
    let pair = samplers.train.get_pair(0, &mut rng).unwrap();
    assert_eq!(pair.before.dim(), (2, 16, 16));
    assert_eq!(pair.after.dim(), (2, 16, 16));
    assert_eq!(pair.label.dim(), (16, 16));

    let stacked = samplers.val.get_stacked(samplers.val.len() - 1, &mut rng).unwrap();
    assert_eq!(stacked.images.dim(), (2, 2, 16, 16));
    assert!(matches!(
        samplers.val.get_stacked(samplers.val.len(), &mut rng),
        Err(PrepError::IndexOutOfRange { .. })
    ));
}

#[test]
fn test_missing_band_file_fails_the_build() {
    let mut fixture = fixture(&CITIES);
    let missing = fixture
        .dir
        .path()
        .join("images")
        .join("rennes")
        .join("imgs_2")
        .join("S2A_rennes_B03.tif");
    fixture.source.bands.remove(&missing);

    let builder = DatasetBuilder::with_source(config(fixture.dir.path(), "1"), fixture.source).unwrap();
    match builder.build() {
        Err(PrepError::MissingBand { city, band, path, .. }) => {
            assert_eq!(city, "rennes");
            assert_eq!(band, "B03");
            assert_eq!(path, missing);
        }
        other => panic!("expected MissingBand, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn test_patch_larger_than_city_fails_before_imagery() {
    let fixture = fixture(&CITIES);
    let mut config = config(fixture.dir.path(), "1");
    config.tiling = TilingParams { patch_size: 40, stride: 20 };
    let builder = DatasetBuilder::with_source(config, fixture.source).unwrap();
    assert!(matches!(builder.prepare_samplers(), Err(PrepError::Config(_))));
}

#[test]
fn test_validation_index_out_of_range() {
    let fixture = fixture(&CITIES);
    let builder = DatasetBuilder::with_source(config(fixture.dir.path(), "3"), fixture.source).unwrap();
    assert!(matches!(builder.prepare_samplers(), Err(PrepError::Config(_))));
}

#[test]
fn test_multidate_layout_from_metadata() {
    let fixture = fixture(&[("paris", 40, 48), ("rennes", 40, 40)]);
    let root = fixture.dir.path();
    let images = root.join("images");
    let metadata = format!(
        r#"{{ "paris": {{ "0": "{p1}", "1": "{p2}", "2": "{p1}" }} }}"#,
        p1 = images.join("paris").join("imgs_1").display(),
        p2 = images.join("paris").join("imgs_2").display(),
    );
    fs::write(root.join("multidate_metadata.json"), metadata).unwrap();

    let mut config = config(root, "0");
    config.multidate = true;
    config.stretch = StretchPolicy::multidate();
    let builder = DatasetBuilder::with_source(config, fixture.source).unwrap();

    // only cities listed in the metadata take part
    assert_eq!(builder.layout().cities().unwrap(), vec!["paris"]);
    let dataset = builder.build().unwrap();
    let record = dataset.city("paris").unwrap();
    assert_eq!(record.images.dim(), (2, 3, 40, 48));
}
