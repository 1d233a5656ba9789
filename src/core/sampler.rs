use crate::core::augment::Augmentation;
use crate::core::dataset::Dataset;
use crate::types::{CityRecord, ImageStack, Mask, PrepError, PrepResult, TileCoordinate};
use ndarray::{s, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Image/label window cut from a city mosaic
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// (bands, dates, size, size)
    pub images: ImageStack,
    /// (size, size)
    pub label: Mask,
}

/// Per-date tensors for a siamese model with the shared label
#[derive(Debug, Clone, PartialEq)]
pub struct PairSample {
    /// Reference date, (bands, size, size)
    pub before: Array3<f32>,
    /// Second date, (bands, size, size)
    pub after: Array3<f32>,
    pub label: Mask,
}

/// Full date stack with the label
#[derive(Debug, Clone, PartialEq)]
pub struct StackedSample {
    pub images: ImageStack,
    pub label: Mask,
}

impl Patch {
    /// Same geometric transform on every band/date image and on the label
    pub fn augmented(&self, augmentation: &Augmentation) -> Patch {
        if augmentation.is_identity() {
            return self.clone();
        }
        Patch {
            images: augmentation.apply(&self.images, Axis(2), Axis(3)),
            label: augmentation.apply(&self.label, Axis(0), Axis(1)),
        }
    }

    /// Split a two-date patch into its dates; longer stacks must use [`Patch::into_stacked`]
    pub fn into_pair(self) -> PrepResult<PairSample> {
        let num_dates = self.images.len_of(Axis(1));
        if num_dates != 2 {
            return Err(PrepError::InvalidFormat(format!(
                "Pair sample needs exactly two dates, patch has {}",
                num_dates
            )));
        }
        Ok(PairSample {
            before: self.images.index_axis(Axis(1), 0).to_owned(),
            after: self.images.index_axis(Axis(1), 1).to_owned(),
            label: self.label,
        })
    }

    pub fn into_stacked(self) -> StackedSample {
        StackedSample {
            images: self.images,
            label: self.label,
        }
    }
}

/// Cut the `size` x `size` window at `tile` out of a city's images and label
pub fn extract_patch(record: &CityRecord, tile: &TileCoordinate, size: usize) -> PrepResult<Patch> {
    let (height, width) = record.spatial_dim();
    if tile.row + size > height || tile.col + size > width {
        return Err(PrepError::InvalidFormat(format!(
            "Tile {} of size {} exceeds {}x{} mosaic",
            tile, size, height, width
        )));
    }

    let rows = tile.row..tile.row + size;
    let cols = tile.col..tile.col + size;
    Ok(Patch {
        images: record.images.slice(s![.., .., rows.clone(), cols.clone()]).to_owned(),
        label: record.label.slice(s![rows, cols]).to_owned(),
    })
}

/// Fixed-length, shuffled-once enumeration of tiles over a shared dataset.
///
/// The tile order is decided at construction from an explicit seed and never
/// changes; build a new sampler to get a new order.
#[derive(Debug, Clone)]
pub struct PatchSampler {
    dataset: Arc<Dataset>,
    tiles: Vec<TileCoordinate>,
    patch_size: usize,
    augment: bool,
}

impl PatchSampler {
    pub fn new(
        dataset: Arc<Dataset>,
        mut tiles: Vec<TileCoordinate>,
        patch_size: usize,
        augment: bool,
        seed: u64,
    ) -> PrepResult<Self> {
        if patch_size == 0 {
            return Err(PrepError::Config("Patch size must be positive".to_string()));
        }
        for tile in &tiles {
            let record = dataset.city(&tile.city_id)?;
            let (height, width) = record.spatial_dim();
            if tile.row + patch_size > height || tile.col + patch_size > width {
                return Err(PrepError::Config(format!(
                    "Tile {} of size {} exceeds {}x{} mosaic",
                    tile, patch_size, height, width
                )));
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        tiles.shuffle(&mut rng);

        log::info!(
            "Sampler over {} tiles (patch {}, augment {}, seed {})",
            tiles.len(),
            patch_size,
            augment,
            seed
        );
        Ok(Self {
            dataset,
            tiles,
            patch_size,
            augment,
        })
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile order, fixed at construction
    pub fn tiles(&self) -> &[TileCoordinate] {
        &self.tiles
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    pub fn augments(&self) -> bool {
        self.augment
    }

    pub fn tile(&self, index: usize) -> PrepResult<&TileCoordinate> {
        self.tiles.get(index).ok_or(PrepError::IndexOutOfRange {
            index,
            len: self.tiles.len(),
        })
    }

    /// Extract (and, if enabled, augment) the patch at `index`
    pub fn get_patch<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> PrepResult<Patch> {
        let tile = self.tile(index)?;
        let record = self.dataset.city(&tile.city_id)?;
        let patch = extract_patch(record, tile, self.patch_size)?;

        if self.augment {
            let augmentation = Augmentation::random(rng);
            log::trace!("Tile {} augmented with {:?}", tile, augmentation);
            Ok(patch.augmented(&augmentation))
        } else {
            Ok(patch)
        }
    }

    /// Two per-date tensors plus label, for siamese models
    pub fn get_pair<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> PrepResult<PairSample> {
        self.get_patch(index, rng)?.into_pair()
    }

    /// Full (bands, dates, size, size) stack plus label
    pub fn get_stacked<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> PrepResult<StackedSample> {
        Ok(self.get_patch(index, rng)?.into_stacked())
    }
}
