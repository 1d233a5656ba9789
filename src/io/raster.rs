use crate::types::{Mask, PrepError, PrepResult, Raster};
use gdal::Dataset;
use ndarray::{Array2, Array3, Axis};
use std::path::Path;

/// Storage backend for band rasters and change masks.
///
/// Implementations are shared across worker threads while a city is loaded.
pub trait RasterSource: Send + Sync {
    /// Read the first band of a raster file as floating point
    fn read_band(&self, path: &Path) -> PrepResult<Raster>;

    /// Read a single-channel 8-bit mask (0/255 encoded)
    fn read_mask(&self, path: &Path) -> PrepResult<Array2<u8>>;

    /// Read every band of a multi-band file as `(bands, height, width)`
    fn read_bands(&self, path: &Path) -> PrepResult<Array3<f32>> {
        Ok(self.read_band(path)?.insert_axis(Axis(0)))
    }
}

/// GDAL-backed reader for GeoTIFF bands and PNG change masks
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalRasterSource;

impl GdalRasterSource {
    fn open(path: &Path) -> PrepResult<Dataset> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        log::debug!(
            "Opened {} ({}x{}, {} bands)",
            path.display(),
            width,
            height,
            dataset.raster_count()
        );
        Ok(dataset)
    }

    /// Read 1-based band `index` of an open dataset
    fn read_band_at<T: Copy + gdal::raster::GdalType>(
        dataset: &Dataset,
        index: isize,
        path: &Path,
    ) -> PrepResult<Array2<T>> {
        let (width, height) = dataset.raster_size();
        let rasterband = dataset.rasterband(index)?;
        let buffer = rasterband.read_as::<T>((0, 0), (width, height), (width, height), None)?;

        Array2::from_shape_vec((height, width), buffer.data).map_err(|e| {
            PrepError::InvalidFormat(format!(
                "Failed to reshape band {} of raster {}: {}",
                index,
                path.display(),
                e
            ))
        })
    }

    fn read_first_band<T: Copy + gdal::raster::GdalType>(path: &Path) -> PrepResult<Array2<T>> {
        let dataset = Self::open(path)?;
        Self::read_band_at(&dataset, 1, path)
    }
}

impl RasterSource for GdalRasterSource {
    fn read_band(&self, path: &Path) -> PrepResult<Raster> {
        Self::read_first_band::<f32>(path)
    }

    fn read_mask(&self, path: &Path) -> PrepResult<Array2<u8>> {
        Self::read_first_band::<u8>(path)
    }

    fn read_bands(&self, path: &Path) -> PrepResult<Array3<f32>> {
        let dataset = Self::open(path)?;
        let (width, height) = dataset.raster_size();
        let count = dataset.raster_count().max(0) as usize;

        let mut stack = Array3::<f32>::zeros((count, height, width));
        for (b, mut plane) in stack.outer_iter_mut().enumerate() {
            plane.assign(&Self::read_band_at::<f32>(&dataset, b as isize + 1, path)?);
        }
        Ok(stack)
    }
}

/// Convert a 0/255 encoded change mask into {0, 1}
pub fn binarize_mask(encoded: &Array2<u8>) -> Mask {
    encoded.mapv(|v| v / 255)
}

/// Read a change mask and binarize it
pub fn load_label(source: &dyn RasterSource, path: &Path) -> PrepResult<Mask> {
    log::debug!("Loading change mask from: {}", path.display());
    let encoded = source.read_mask(path)?;
    Ok(binarize_mask(&encoded))
}
