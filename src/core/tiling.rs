use crate::config::TilingParams;
use crate::types::{PrepError, PrepResult, TileCoordinate};
use std::collections::BTreeSet;

/// Patch origins `(row, col)` stepping by `stride` from 0, kept only when the patch fits
pub fn tile_origins(height: usize, width: usize, patch_size: usize, stride: usize) -> Vec<(usize, usize)> {
    if patch_size == 0 || stride == 0 || patch_size > height || patch_size > width {
        return Vec::new();
    }

    let rows = (0..height).step_by(stride).filter(|r| r + patch_size <= height);
    rows.flat_map(|r| {
        (0..width)
            .step_by(stride)
            .filter(move |c| c + patch_size <= width)
            .map(move |c| (r, c))
    })
    .collect()
}

/// Partition city indices `0..num_cities` into (train, validation)
pub fn split_city_indices(
    num_cities: usize,
    val_indices: &BTreeSet<usize>,
) -> PrepResult<(Vec<usize>, Vec<usize>)> {
    if val_indices.is_empty() {
        return Err(PrepError::Config("Validation city set is empty".to_string()));
    }
    if let Some(&bad) = val_indices.iter().find(|&&i| i >= num_cities) {
        return Err(PrepError::Config(format!(
            "Validation city index {} out of range for {} cities",
            bad, num_cities
        )));
    }

    let train = (0..num_cities).filter(|i| !val_indices.contains(i)).collect();
    let val = val_indices.iter().copied().collect();
    Ok((train, val))
}

/// Train and validation tile lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileGrid {
    pub train: Vec<TileCoordinate>,
    pub val: Vec<TileCoordinate>,
}

/// Enumerates patch origins per city for both splits.
///
/// Training tiles step by the configured stride and may overlap. Validation
/// tiles step by the patch size so no pixel is counted twice.
#[derive(Debug, Clone)]
pub struct GridGenerator {
    params: TilingParams,
}

impl GridGenerator {
    pub fn new(params: TilingParams) -> PrepResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Tiles of one city at the given stride
    pub fn city_tiles(&self, city_id: &str, dims: (usize, usize), stride: usize) -> PrepResult<Vec<TileCoordinate>> {
        let (height, width) = dims;
        let patch_size = self.params.patch_size;
        if patch_size >= height || patch_size >= width {
            return Err(PrepError::Config(format!(
                "Patch size {} does not fit inside city {} ({}x{})",
                patch_size, city_id, height, width
            )));
        }

        Ok(tile_origins(height, width, patch_size, stride)
            .into_iter()
            .map(|(row, col)| TileCoordinate::new(city_id, row, col))
            .collect())
    }

    /// Build both splits; `cities` is `(city_id, (height, width))` in city-index order
    pub fn generate(
        &self,
        cities: &[(String, (usize, usize))],
        val_indices: &BTreeSet<usize>,
    ) -> PrepResult<TileGrid> {
        let (train_cities, val_cities) = split_city_indices(cities.len(), val_indices)?;

        let mut grid = TileGrid::default();
        for &index in &train_cities {
            let (city_id, dims) = &cities[index];
            grid.train
                .extend(self.city_tiles(city_id, *dims, self.params.stride)?);
        }
        for &index in &val_cities {
            let (city_id, dims) = &cities[index];
            grid.val
                .extend(self.city_tiles(city_id, *dims, self.params.patch_size)?);
        }

        log::info!(
            "Tiling grid: {} train tiles from {} cities, {} validation tiles from {} cities",
            grid.train.len(),
            train_cities.len(),
            grid.val.len(),
            val_cities.len()
        );
        Ok(grid)
    }
}
