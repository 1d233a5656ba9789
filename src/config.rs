//! Immutable configuration values threaded through the preparation pipeline

use crate::types::{PrepError, PrepResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Sentinel-2 band identifiers with their saturation ceilings
const SENTINEL2_BANDS: [(&str, f32); 13] = [
    ("B01", 19348.0),
    ("B02", 20566.0),
    ("B03", 18989.0),
    ("B04", 17881.0),
    ("B05", 17374.0),
    ("B06", 17160.0),
    ("B07", 16950.0),
    ("B08", 16708.0),
    ("B8A", 16627.0),
    ("B09", 16204.0),
    ("B10", 6000.0),
    ("B11", 15465.0),
    ("B12", 15273.0),
];

/// Ordered band list and per-band saturation ceilings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    /// Band identifiers, in stacking order
    pub band_ids: Vec<String>,
    /// Maximum valid value per band identifier
    pub ceilings: BTreeMap<String, f32>,
    /// Radiometric floor shared by all bands
    #[serde(default)]
    pub floor: f32,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            band_ids: SENTINEL2_BANDS.iter().map(|(id, _)| id.to_string()).collect(),
            ceilings: SENTINEL2_BANDS
                .iter()
                .map(|(id, max)| (id.to_string(), *max))
                .collect(),
            floor: 0.0,
        }
    }
}

impl BandConfig {
    /// Restrict the configuration to a subset of bands, keeping their ceilings
    pub fn with_bands<S: AsRef<str>>(&self, band_ids: &[S]) -> PrepResult<Self> {
        let config = Self {
            band_ids: band_ids.iter().map(|b| b.as_ref().to_string()).collect(),
            ceilings: self.ceilings.clone(),
            floor: self.floor,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.band_ids.is_empty() {
            return Err(PrepError::Config("Band list is empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        for band in &self.band_ids {
            if band.is_empty() {
                return Err(PrepError::Config("Empty band identifier".to_string()));
            }
            if !seen.insert(band.as_str()) {
                return Err(PrepError::Config(format!("Duplicate band identifier {}", band)));
            }
            let ceiling = self.ceiling(band)?;
            if !ceiling.is_finite() || ceiling <= self.floor {
                return Err(PrepError::Config(format!(
                    "Ceiling {} for band {} must exceed floor {}",
                    ceiling, band, self.floor
                )));
            }
        }

        Ok(())
    }

    pub fn ceiling(&self, band_id: &str) -> PrepResult<f32> {
        self.ceilings
            .get(band_id)
            .copied()
            .ok_or_else(|| PrepError::Config(format!("No saturation ceiling for band {}", band_id)))
    }

    pub fn len(&self) -> usize {
        self.band_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.band_ids.is_empty()
    }
}

/// How raw reflectance is mapped onto the 8-bit range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StretchPolicy {
    /// Clip at each band's saturation ceiling, stretch from the shared floor
    Ceiling,
    /// Stretch between two percentiles of the band's own values
    Percentile { low: f64, high: f64 },
}

impl Default for StretchPolicy {
    fn default() -> Self {
        StretchPolicy::Ceiling
    }
}

impl StretchPolicy {
    /// Percentile window used for the multi-date loader
    pub fn multidate() -> Self {
        StretchPolicy::Percentile { low: 2.0, high: 98.0 }
    }

    /// Percentile window used for single-scene multi-band products
    pub fn scene() -> Self {
        StretchPolicy::Percentile { low: 0.01, high: 99.0 }
    }

    pub fn validate(&self) -> PrepResult<()> {
        if let StretchPolicy::Percentile { low, high } = *self {
            if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
                return Err(PrepError::Config(format!(
                    "Invalid percentile window {}..{}",
                    low, high
                )));
            }
        }
        Ok(())
    }
}

/// Patch geometry for the tiling grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingParams {
    /// Side length of a square patch in pixels
    pub patch_size: usize,
    /// Spacing of training patch origins
    pub stride: usize,
}

impl Default for TilingParams {
    fn default() -> Self {
        Self {
            patch_size: 120,
            stride: 60,
        }
    }
}

impl TilingParams {
    pub fn validate(&self) -> PrepResult<()> {
        if self.patch_size == 0 {
            return Err(PrepError::Config("Patch size must be positive".to_string()));
        }
        if self.stride == 0 {
            return Err(PrepError::Config("Stride must be positive".to_string()));
        }
        Ok(())
    }
}

/// Parse a comma-separated list of city indices such as `"1,3,5"`
pub fn parse_city_indices(spec: &str) -> PrepResult<BTreeSet<usize>> {
    if spec.trim().is_empty() {
        return Err(PrepError::Config("Validation city set is empty".to_string()));
    }

    let mut indices = BTreeSet::new();
    for (position, token) in spec.split(',').enumerate() {
        let token = token.trim();
        if token.is_empty() {
            return Err(PrepError::Config(format!(
                "Empty city index at position {} in '{}'",
                position, spec
            )));
        }
        let index = token.parse::<usize>().map_err(|e| {
            PrepError::Config(format!("Invalid city index '{}': {}", token, e))
        })?;
        indices.insert(index);
    }

    Ok(indices)
}

fn default_seed() -> u64 {
    42
}

fn default_augment_train() -> bool {
    true
}

/// Full set of parameters needed to build samplers from a dataset directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepConfig {
    /// Root containing `train_labels/` and `images/`
    pub dataset_dir: PathBuf,
    #[serde(default)]
    pub bands: BandConfig,
    #[serde(default)]
    pub stretch: StretchPolicy,
    #[serde(default)]
    pub tiling: TilingParams,
    /// Comma-separated indices (into the sorted city list) held out for validation
    pub val_cities: String,
    /// Seed for the construction-time shuffle of tile order
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_augment_train")]
    pub augment_train: bool,
    /// Upper bound on worker threads; defaults to the size of each unit of work
    #[serde(default)]
    pub max_workers: Option<usize>,
    /// Read date directories from `multidate_metadata.json` instead of `imgs_1`/`imgs_2`
    #[serde(default)]
    pub multidate: bool,
}

impl PrepConfig {
    pub fn new(dataset_dir: impl Into<PathBuf>, val_cities: impl Into<String>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            bands: BandConfig::default(),
            stretch: StretchPolicy::default(),
            tiling: TilingParams::default(),
            val_cities: val_cities.into(),
            seed: default_seed(),
            augment_train: default_augment_train(),
            max_workers: None,
            multidate: false,
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PrepResult<Self> {
        log::info!("Loading preparation config from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PrepConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on anything that would only surface mid-training
    pub fn validate(&self) -> PrepResult<()> {
        self.bands.validate()?;
        self.stretch.validate()?;
        self.tiling.validate()?;
        parse_city_indices(&self.val_cities)?;
        if self.max_workers == Some(0) {
            return Err(PrepError::Config("max_workers must be positive".to_string()));
        }
        Ok(())
    }

    pub fn val_city_indices(&self) -> PrepResult<BTreeSet<usize>> {
        parse_city_indices(&self.val_cities)
    }
}

fn default_scene_patch_size() -> usize {
    TilingParams::default().patch_size
}

fn default_change_file() -> String {
    crate::io::scene::DEFAULT_CHANGE_FILE.to_string()
}

fn default_scene_stretch() -> StretchPolicy {
    StretchPolicy::scene()
}

/// Parameters for a single scene whose patch origins come from a CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Root containing `Images/` and `Ground_truth/Changes/`
    pub scene_dir: PathBuf,
    /// `row,col` patch origins, one per line
    pub origins_csv: PathBuf,
    #[serde(default = "default_scene_patch_size")]
    pub patch_size: usize,
    /// Must be a percentile window; scene bands carry no per-band ceilings
    #[serde(default = "default_scene_stretch")]
    pub stretch: StretchPolicy,
    #[serde(default = "default_change_file")]
    pub change_file: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl SceneConfig {
    pub fn new(scene_dir: impl Into<PathBuf>, origins_csv: impl Into<PathBuf>) -> Self {
        Self {
            scene_dir: scene_dir.into(),
            origins_csv: origins_csv.into(),
            patch_size: default_scene_patch_size(),
            stretch: default_scene_stretch(),
            change_file: default_change_file(),
            seed: default_seed(),
            max_workers: None,
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PrepResult<Self> {
        log::info!("Loading scene config from: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SceneConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PrepResult<()> {
        if self.patch_size == 0 {
            return Err(PrepError::Config("Patch size must be positive".to_string()));
        }
        if let StretchPolicy::Ceiling = self.stretch {
            return Err(PrepError::Config(
                "Scene stretch must be a percentile window".to_string(),
            ));
        }
        self.stretch.validate()?;
        if self.change_file.is_empty() {
            return Err(PrepError::Config("Change file name is empty".to_string()));
        }
        if self.max_workers == Some(0) {
            return Err(PrepError::Config("max_workers must be positive".to_string()));
        }
        Ok(())
    }
}
