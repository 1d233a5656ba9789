use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Single spectral band for one date at one city
pub type Raster = Array2<f32>;

/// Binary change mask, values in {0, 1}
pub type Mask = Array2<u8>;

/// Normalized image stack (bands x dates x height x width)
pub type ImageStack = Array4<f32>;

/// Fully assembled mosaic and ground truth for one city
#[derive(Debug, Clone)]
pub struct CityRecord {
    pub city_id: String,
    pub images: ImageStack,
    pub label: Mask,
}

impl CityRecord {
    /// Build a record, rejecting stacks whose spatial size disagrees with the label
    pub fn new(city_id: impl Into<String>, images: ImageStack, label: Mask) -> PrepResult<Self> {
        let city_id = city_id.into();
        let (_, _, height, width) = images.dim();
        if (height, width) != label.dim() {
            return Err(PrepError::InvalidFormat(format!(
                "City {}: image stack is {}x{} but label is {}x{}",
                city_id,
                height,
                width,
                label.nrows(),
                label.ncols()
            )));
        }

        Ok(Self { city_id, images, label })
    }

    pub fn num_bands(&self) -> usize {
        self.images.dim().0
    }

    pub fn num_dates(&self) -> usize {
        self.images.dim().1
    }

    /// (height, width) of the mosaic
    pub fn spatial_dim(&self) -> (usize, usize) {
        self.label.dim()
    }
}

/// Origin of one patch inside a city's mosaic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub city_id: String,
    pub row: usize,
    pub col: usize,
}

impl TileCoordinate {
    pub fn new(city_id: impl Into<String>, row: usize, col: usize) -> Self {
        Self {
            city_id: city_id.into(),
            row,
            col,
        }
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@({}, {})", self.city_id, self.row, self.col)
    }
}

/// Error types for dataset preparation
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Numeric error: {0}")]
    Numeric(String),

    #[error("Band {band} for city {city} could not be read from {path}: {reason}")]
    MissingBand {
        city: String,
        band: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Sample index {index} out of range for sampler of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for preparation operations
pub type PrepResult<T> = Result<T, PrepError>;
