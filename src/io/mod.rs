//! I/O modules for reading band rasters, change masks and dataset layouts

pub mod raster;
pub mod layout;
pub mod scene;

pub use raster::{GdalRasterSource, RasterSource, binarize_mask, load_label};
pub use layout::{BandPrefix, DatasetLayout, MultidateMetadata, find_band_prefix};
pub use scene::{SceneLayout, change_mask, parse_origins, read_origins_csv, select_bands};
