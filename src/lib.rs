//! Ondine: multi-temporal Sentinel-2 patch preparation for change detection
//!
//! Reads every band of every acquisition date for each city, harmonizes later
//! dates onto the first through histogram matching, stretches to `[0, 1]` and
//! stacks the result against the city's change mask. The assembled mosaics are
//! carved into fixed-size train/validation patches with optional geometric
//! augmentation. Single-scene multi-band products with a listed set of patch
//! origins are served through the same sampler.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    CityRecord, ImageStack, Mask, PrepError, PrepResult, Raster, TileCoordinate
};

pub use config::{
    BandConfig, PrepConfig, SceneConfig, StretchPolicy, TilingParams, parse_city_indices
};

pub use io::{DatasetLayout, GdalRasterSource, RasterSource, SceneLayout};

pub use core::{
    Augmentation, Dataset, DatasetBuilder, EnsembleReader, GridGenerator, PatchSampler,
    SceneBuilder, SplitSamplers, match_histogram, normalize_band, prepare_samplers,
    prepare_scene_sampler, stretch_8bit
};
