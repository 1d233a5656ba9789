use crate::config::{SceneConfig, StretchPolicy};
use crate::core::dataset::Dataset;
use crate::core::normalize::{normalize_band, percentile};
use crate::core::resample::resize_bilinear;
use crate::core::sampler::PatchSampler;
use crate::io::raster::{GdalRasterSource, RasterSource};
use crate::io::scene::{change_mask, read_origins_csv, select_bands, SceneLayout};
use crate::types::{CityRecord, ImageStack, PrepError, PrepResult, Raster, TileCoordinate};
use ndarray::{s, Axis};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Loads a single multi-band scene and serves its listed patch origins.
///
/// Every date file is read whole, reduced to its four selected planes,
/// percentile-stretched per plane and resized to the change raster. Samples
/// are never augmented.
pub struct SceneBuilder<S: RasterSource = GdalRasterSource> {
    config: SceneConfig,
    layout: SceneLayout,
    source: S,
    pool: rayon::ThreadPool,
}

impl SceneBuilder<GdalRasterSource> {
    pub fn new(config: SceneConfig) -> PrepResult<Self> {
        Self::with_source(config, GdalRasterSource)
    }
}

impl<S: RasterSource> SceneBuilder<S> {
    pub fn with_source(config: SceneConfig, source: S) -> PrepResult<Self> {
        config.validate()?;

        let layout = SceneLayout::new(&config.scene_dir).with_change_file(&config.change_file);
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("ondine-scene-{}", i));
        if let Some(workers) = config.max_workers {
            builder = builder.num_threads(workers);
        }
        let pool = builder
            .build()
            .map_err(|e| PrepError::Processing(format!("Failed to build worker pool: {}", e)))?;

        Ok(Self {
            config,
            layout,
            source,
            pool,
        })
    }

    pub fn layout(&self) -> &SceneLayout {
        &self.layout
    }

    /// Read every date and the change raster into one record
    pub fn load_scene(&self) -> PrepResult<CityRecord> {
        let start = Instant::now();
        let scene_id = self.layout.scene_id();

        let label = change_mask(&self.source.read_mask(&self.layout.label_path())?);
        let target_shape = label.dim();
        let files = self.layout.date_files()?;
        log::info!(
            "Loading scene {}: {} dates -> {}x{}",
            scene_id,
            files.len(),
            target_shape.0,
            target_shape.1
        );

        let dates = self.pool.install(|| {
            files
                .par_iter()
                .map(|path| self.read_date(path, target_shape))
                .collect::<PrepResult<Vec<_>>>()
        })?;

        let num_bands = dates.first().map(|bands| bands.len()).unwrap_or(0);
        if let Some((d, bands)) = dates.iter().enumerate().find(|(_, b)| b.len() != num_bands) {
            return Err(PrepError::InvalidFormat(format!(
                "Date {} of scene {} has {} bands, earlier dates have {}",
                files[d].display(),
                scene_id,
                bands.len(),
                num_bands
            )));
        }

        let (height, width) = target_shape;
        let mut stack = ImageStack::zeros((num_bands, dates.len(), height, width));
        for (d, bands) in dates.iter().enumerate() {
            for (b, band) in bands.iter().enumerate() {
                stack.slice_mut(s![b, d, .., ..]).assign(band);
            }
        }

        log::info!("Scene {} loaded in {:?}", scene_id, start.elapsed());
        CityRecord::new(scene_id, stack, label)
    }

    fn read_date(&self, path: &Path, target_shape: (usize, usize)) -> PrepResult<Vec<Raster>> {
        let planes = self.source.read_bands(path)?;
        let selected = select_bands(planes.len_of(Axis(0))).map_err(|e| {
            PrepError::InvalidFormat(format!("{}: {}", path.display(), e))
        })?;

        selected
            .into_iter()
            .map(|b| {
                let band = planes.index_axis(Axis(0), b).to_owned();
                let (floor, ceiling) = self.bounds(&band)?;
                let normalized = normalize_band(&band, ceiling, floor).map_err(|e| match e {
                    PrepError::Numeric(msg) => PrepError::Numeric(format!(
                        "{} band {}: {}",
                        path.display(),
                        b,
                        msg
                    )),
                    other => other,
                })?;
                resize_bilinear(&normalized, target_shape)
            })
            .collect()
    }

    fn bounds(&self, band: &Raster) -> PrepResult<(f32, f32)> {
        match self.config.stretch {
            StretchPolicy::Percentile { low, high } => {
                Ok((percentile(band, low)?, percentile(band, high)?))
            }
            StretchPolicy::Ceiling => Err(PrepError::Config(
                "Scene stretch must be a percentile window".to_string(),
            )),
        }
    }

    /// Unaugmented sampler over the CSV origins, shuffled once with the configured seed
    pub fn prepare_sampler(&self) -> PrepResult<PatchSampler> {
        // origins first so a malformed list fails before imagery is read
        let origins = read_origins_csv(&self.config.origins_csv)?;
        let record = self.load_scene()?;

        let tiles: Vec<TileCoordinate> = origins
            .into_iter()
            .map(|(row, col)| TileCoordinate::new(record.city_id.as_str(), row, col))
            .collect();
        let dataset = Arc::new(Dataset::from_records(vec![record]));

        PatchSampler::new(dataset, tiles, self.config.patch_size, false, self.config.seed)
    }
}

/// Build the single-scene sampler from GDAL-readable files
pub fn prepare_scene_sampler(config: SceneConfig) -> PrepResult<PatchSampler> {
    SceneBuilder::new(config)?.prepare_sampler()
}
