//! Core preparation modules

pub mod normalize;
pub mod histogram_match;
pub mod resample;
pub mod ensemble;
pub mod tiling;
pub mod augment;
pub mod sampler;
pub mod dataset;
pub mod scene;

// Re-export main types
pub use normalize::{Normalizer, clip_to_ceiling, normalize_band, percentile, stretch_8bit, to_unit_range};
pub use histogram_match::match_histogram;
pub use resample::resize_bilinear;
pub use ensemble::EnsembleReader;
pub use tiling::{GridGenerator, TileGrid, split_city_indices, tile_origins};
pub use augment::{Augmentation, Rotation};
pub use sampler::{PairSample, Patch, PatchSampler, StackedSample, extract_patch};
pub use dataset::{Dataset, DatasetBuilder, SplitSamplers, prepare_samplers};
pub use scene::{SceneBuilder, prepare_scene_sampler};
