use crate::core::histogram_match::match_histogram;
use crate::core::normalize::Normalizer;
use crate::core::resample::resize_bilinear;
use crate::io::layout::BandPrefix;
use crate::io::raster::{load_label, GdalRasterSource, RasterSource};
use crate::types::{ImageStack, Mask, PrepError, PrepResult, Raster};
use ndarray::{s, Array4};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::PathBuf;
use std::time::Instant;

/// Reads, harmonizes and stacks every band of every date for a city.
///
/// The first date is the radiometric reference: each later date's band is
/// histogram-matched to the reference date's band with the same identifier
/// before stretching. All parallel work runs on a bounded pool owned by the
/// reader and results are gathered by input position.
pub struct EnsembleReader<S: RasterSource = GdalRasterSource> {
    normalizer: Normalizer,
    source: S,
    pool: ThreadPool,
}

impl<S: RasterSource> EnsembleReader<S> {
    /// Create a reader; the pool defaults to one worker per band file of a two-date city
    pub fn new(normalizer: Normalizer, source: S, max_workers: Option<usize>) -> PrepResult<Self> {
        let workers = max_workers.unwrap_or(2 * normalizer.bands().len()).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ondine-band-{}", i))
            .build()
            .map_err(|e| PrepError::Processing(format!("Failed to build worker pool: {}", e)))?;

        log::debug!("Ensemble reader using {} workers", workers);
        Ok(Self {
            normalizer,
            source,
            pool,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run arbitrary parallel work inside the reader's bounded pool
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Load change masks in parallel, one unit per path, preserving input order
    pub fn load_labels(&self, paths: &[PathBuf]) -> PrepResult<Vec<Mask>> {
        let start = Instant::now();
        let labels = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| load_label(&self.source, path))
                .collect::<PrepResult<Vec<_>>>()
        })?;
        log::info!("Loaded {} change masks in {:?}", labels.len(), start.elapsed());
        Ok(labels)
    }

    /// Build the (bands, dates, height, width) stack for one city
    pub fn read_city(
        &self,
        city_id: &str,
        date_prefixes: &[BandPrefix],
        target_shape: (usize, usize),
    ) -> PrepResult<ImageStack> {
        if date_prefixes.is_empty() {
            return Err(PrepError::Config(format!("City {} has no dates", city_id)));
        }

        let band_ids = &self.normalizer.bands().band_ids;
        let num_bands = band_ids.len();
        let num_dates = date_prefixes.len();
        let (height, width) = target_shape;

        log::info!(
            "Loading city {}: {} bands x {} dates -> {}x{}",
            city_id, num_bands, num_dates, height, width
        );
        let start = Instant::now();

        // Read stage: one unit per (band, date) file, band-major
        let units: Vec<(usize, usize)> = (0..num_bands)
            .flat_map(|b| (0..num_dates).map(move |d| (b, d)))
            .collect();
        let raw = self.pool.install(|| {
            units
                .par_iter()
                .map(|&(b, d)| self.read_unit(city_id, &band_ids[b], &date_prefixes[d]))
                .collect::<PrepResult<Vec<_>>>()
        })?;
        let read_time = start.elapsed();

        let mut raw = raw.into_iter();
        let per_band: Vec<Vec<Raster>> = (0..num_bands)
            .map(|_| raw.by_ref().take(num_dates).collect())
            .collect();

        // Process stage: clip, match, stretch and resize each band independently
        let processed = self.pool.install(|| {
            per_band
                .into_par_iter()
                .zip(band_ids.par_iter())
                .map(|(dates, band_id)| self.process_band(band_id, dates, target_shape))
                .collect::<PrepResult<Vec<_>>>()
        })
        .map_err(|e| match e {
            PrepError::Numeric(msg) => PrepError::Numeric(format!("City {}: {}", city_id, msg)),
            other => other,
        })?;

        let mut stack = Array4::<f32>::zeros((num_bands, num_dates, height, width));
        for (b, dates) in processed.iter().enumerate() {
            for (d, band) in dates.iter().enumerate() {
                stack.slice_mut(s![b, d, .., ..]).assign(band);
            }
        }

        log::info!(
            "City {} loaded in {:?} (read {:?})",
            city_id,
            start.elapsed(),
            read_time
        );
        Ok(stack)
    }

    fn read_unit(&self, city_id: &str, band_id: &str, prefix: &BandPrefix) -> PrepResult<Raster> {
        let path = prefix.band_path(band_id);
        self.source
            .read_band(&path)
            .map_err(|e| PrepError::MissingBand {
                city: city_id.to_string(),
                band: band_id.to_string(),
                path,
                reason: e.to_string(),
            })
    }

    fn process_band(
        &self,
        band_id: &str,
        mut dates: Vec<Raster>,
        target_shape: (usize, usize),
    ) -> PrepResult<Vec<Raster>> {
        for band in dates.iter_mut() {
            self.normalizer.clip_raw(band_id, band)?;
        }

        let (reference, later) = dates
            .split_first()
            .ok_or_else(|| PrepError::Processing(format!("Band {} has no dates", band_id)))?;

        let mut out = Vec::with_capacity(dates.len());
        out.push(self.finish_band(band_id, reference, target_shape)?);
        for band in later {
            let matched = match_histogram(band, reference)?;
            out.push(self.finish_band(band_id, &matched, target_shape)?);
        }
        Ok(out)
    }

    fn finish_band(&self, band_id: &str, band: &Raster, target_shape: (usize, usize)) -> PrepResult<Raster> {
        let normalized = self.normalizer.normalize(band_id, band)?;
        resize_bilinear(&normalized, target_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BandConfig, StretchPolicy};
    use ndarray::Array2;
    use std::collections::HashMap;
    use std::path::Path;

    /// In-memory source keyed by file path
    struct MemorySource {
        bands: HashMap<PathBuf, Raster>,
    }

    impl RasterSource for MemorySource {
        fn read_band(&self, path: &Path) -> PrepResult<Raster> {
            self.bands.get(path).cloned().ok_or_else(|| {
                PrepError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                ))
            })
        }

        fn read_mask(&self, path: &Path) -> PrepResult<Array2<u8>> {
            Err(PrepError::InvalidFormat(path.display().to_string()))
        }
    }

    fn two_band_config() -> BandConfig {
        BandConfig::default().with_bands(&["B02", "B10"]).unwrap()
    }

    fn reader(source: MemorySource) -> EnsembleReader<MemorySource> {
        let normalizer = Normalizer::new(two_band_config(), StretchPolicy::Ceiling).unwrap();
        EnsembleReader::new(normalizer, source, Some(2)).unwrap()
    }

    #[test]
    fn test_worker_count_defaults_to_twice_band_count() {
        let normalizer = Normalizer::new(two_band_config(), StretchPolicy::Ceiling).unwrap();
        let source = MemorySource { bands: HashMap::new() };
        assert_eq!(EnsembleReader::new(normalizer, source, None).unwrap().num_workers(), 4);

        let capped = reader(MemorySource { bands: HashMap::new() });
        assert_eq!(capped.num_workers(), 2);
    }

    #[test]
    fn test_read_city_stacks_bands_by_date() {
        let prefixes = [BandPrefix::new("/c/imgs_1/T_"), BandPrefix::new("/c/imgs_2/T_")];
        let mut bands = HashMap::new();
        bands.insert(prefixes[0].band_path("B02"), Raster::from_elem((4, 4), 20566.0));
        bands.insert(prefixes[1].band_path("B02"), Raster::from_elem((4, 4), 100.0));
        bands.insert(prefixes[0].band_path("B10"), Raster::from_elem((4, 4), 9000.0));
        bands.insert(prefixes[1].band_path("B10"), Raster::from_elem((4, 4), 0.0));

        let stack = reader(MemorySource { bands })
            .read_city("paris", &prefixes, (8, 8))
            .unwrap();

        assert_eq!(stack.dim(), (2, 2, 8, 8));
        // date 1 B02 at its ceiling, B10 clipped to its ceiling
        assert!(stack.slice(s![0, 0, .., ..]).iter().all(|&v| v == 1.0));
        assert!(stack.slice(s![1, 0, .., ..]).iter().all(|&v| v == 1.0));
        // date 2 matched onto the constant reference band
        assert!(stack.slice(s![0, 1, .., ..]).iter().all(|&v| v == 1.0));
        assert!(stack.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_later_dates_take_reference_distribution() {
        let prefixes = [
            BandPrefix::new("/c/imgs_1/T_"),
            BandPrefix::new("/c/imgs_2/T_"),
            BandPrefix::new("/c/imgs_3/T_"),
        ];
        let reference = Raster::from_shape_fn((4, 4), |(i, j)| ((i * 4 + j) * 1000) as f32);
        let shifted = reference.mapv(|v| v / 4.0 + 10.0);

        let mut bands = HashMap::new();
        for band in ["B02", "B10"] {
            bands.insert(prefixes[0].band_path(band), reference.clone());
            bands.insert(prefixes[1].band_path(band), shifted.clone());
            bands.insert(prefixes[2].band_path(band), shifted.mapv(|v| v * 2.0));
        }

        let stack = reader(MemorySource { bands })
            .read_city("lasvegas", &prefixes, (4, 4))
            .unwrap();

        assert_eq!(stack.dim(), (2, 3, 4, 4));
        let first = stack.slice(s![0, 0, .., ..]);
        for d in 1..3 {
            assert_eq!(stack.slice(s![0, d, .., ..]), first);
        }
    }

    #[test]
    fn test_missing_band_is_fatal_for_city() {
        let prefixes = [BandPrefix::new("/c/imgs_1/T_"), BandPrefix::new("/c/imgs_2/T_")];
        let mut bands = HashMap::new();
        bands.insert(prefixes[0].band_path("B02"), Raster::zeros((2, 2)));
        bands.insert(prefixes[1].band_path("B02"), Raster::zeros((2, 2)));
        bands.insert(prefixes[0].band_path("B10"), Raster::zeros((2, 2)));

        let result = reader(MemorySource { bands }).read_city("paris", &prefixes, (2, 2));
        match result {
            Err(PrepError::MissingBand { city, band, path, .. }) => {
                assert_eq!(city, "paris");
                assert_eq!(band, "B10");
                assert_eq!(path, prefixes[1].band_path("B10"));
            }
            other => panic!("expected MissingBand, got {:?}", other),
        }
    }

    #[test]
    fn test_no_dates_is_config_error() {
        let result = reader(MemorySource { bands: HashMap::new() }).read_city("paris", &[], (2, 2));
        assert!(matches!(result, Err(PrepError::Config(_))));
    }
}
