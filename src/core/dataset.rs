use crate::config::PrepConfig;
use crate::core::ensemble::EnsembleReader;
use crate::core::normalize::Normalizer;
use crate::core::sampler::PatchSampler;
use crate::core::tiling::{GridGenerator, TileGrid};
use crate::io::layout::DatasetLayout;
use crate::io::raster::{GdalRasterSource, RasterSource};
use crate::types::{CityRecord, Mask, PrepError, PrepResult};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// All city mosaics, keyed by city id. Built once, then only read.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    cities: BTreeMap<String, CityRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<CityRecord>) -> Self {
        Self {
            cities: records
                .into_iter()
                .map(|record| (record.city_id.clone(), record))
                .collect(),
        }
    }

    pub fn city(&self, city_id: &str) -> PrepResult<&CityRecord> {
        self.cities
            .get(city_id)
            .ok_or_else(|| PrepError::InvalidFormat(format!("Unknown city {}", city_id)))
    }

    /// City ids in city-index order
    pub fn city_ids(&self) -> Vec<&str> {
        self.cities.keys().map(|k| k.as_str()).collect()
    }

    /// `(city_id, (height, width))` in city-index order, as consumed by the grid generator
    pub fn city_dims(&self) -> Vec<(String, (usize, usize))> {
        self.cities
            .values()
            .map(|record| (record.city_id.clone(), record.spatial_dim()))
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &CityRecord> {
        self.cities.values()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

/// Train and validation samplers over one shared dataset
#[derive(Debug, Clone)]
pub struct SplitSamplers {
    pub train: PatchSampler,
    pub val: PatchSampler,
}

/// Assembles a [`Dataset`] from a directory tree
pub struct DatasetBuilder<S: RasterSource = GdalRasterSource> {
    config: PrepConfig,
    layout: DatasetLayout,
    reader: EnsembleReader<S>,
}

impl DatasetBuilder<GdalRasterSource> {
    pub fn new(config: PrepConfig) -> PrepResult<Self> {
        Self::with_source(config, GdalRasterSource)
    }
}

impl<S: RasterSource> DatasetBuilder<S> {
    pub fn with_source(config: PrepConfig, source: S) -> PrepResult<Self> {
        config.validate()?;

        let layout = if config.multidate {
            DatasetLayout::with_multidate_metadata(&config.dataset_dir)?
        } else {
            DatasetLayout::new(&config.dataset_dir)
        };
        let normalizer = Normalizer::new(config.bands.clone(), config.stretch)?;
        let reader = EnsembleReader::new(normalizer, source, config.max_workers)?;

        Ok(Self {
            config,
            layout,
            reader,
        })
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Change masks of every city, in city-index order
    pub fn load_labels(&self) -> PrepResult<Vec<(String, Mask)>> {
        let cities = self.layout.cities()?;
        let paths: Vec<PathBuf> = cities.iter().map(|c| self.layout.label_path(c)).collect();
        let labels = self.reader.load_labels(&paths)?;
        Ok(cities.into_iter().zip(labels).collect())
    }

    /// Tiling grid from label dimensions alone, so bad tiling fails before imagery is read
    pub fn grid(&self, labels: &[(String, Mask)]) -> PrepResult<TileGrid> {
        let dims: Vec<(String, (usize, usize))> = labels
            .iter()
            .map(|(city, label)| (city.clone(), label.dim()))
            .collect();
        GridGenerator::new(self.config.tiling)?.generate(&dims, &self.config.val_city_indices()?)
    }

    /// Read every city's image stack at its label's resolution
    pub fn build_from_labels(&self, labels: Vec<(String, Mask)>) -> PrepResult<Dataset> {
        let start = Instant::now();
        let band_ids = &self.config.bands.band_ids;

        let records = self.reader.install(|| {
            labels
                .into_par_iter()
                .map(|(city, label)| {
                    let prefixes = self.layout.date_prefixes(&city, band_ids)?;
                    let images = self.reader.read_city(&city, &prefixes, label.dim())?;
                    CityRecord::new(city, images, label)
                })
                .collect::<PrepResult<Vec<_>>>()
        })?;

        log::info!("Dataset of {} cities built in {:?}", records.len(), start.elapsed());
        Ok(Dataset::from_records(records))
    }

    pub fn build(&self) -> PrepResult<Dataset> {
        let labels = self.load_labels()?;
        self.build_from_labels(labels)
    }

    /// Build the dataset and both samplers; lengths equal the grid's split sizes
    pub fn prepare_samplers(&self) -> PrepResult<SplitSamplers> {
        let labels = self.load_labels()?;
        let grid = self.grid(&labels)?;
        let dataset = Arc::new(self.build_from_labels(labels)?);

        let patch_size = self.config.tiling.patch_size;
        let train = PatchSampler::new(
            Arc::clone(&dataset),
            grid.train,
            patch_size,
            self.config.augment_train,
            self.config.seed,
        )?;
        let val = PatchSampler::new(dataset, grid.val, patch_size, false, self.config.seed)?;

        Ok(SplitSamplers { train, val })
    }
}

/// Build train/validation samplers from a configuration using GDAL-readable files
pub fn prepare_samplers(config: PrepConfig) -> PrepResult<SplitSamplers> {
    DatasetBuilder::new(config)?.prepare_samplers()
}
