use crate::config::{BandConfig, StretchPolicy};
use crate::types::{PrepError, PrepResult, Raster};
use ndarray::Array2;

const BYTE_MAX: f32 = 255.0;

/// Clamp every value above the band's saturation ceiling down to the ceiling
pub fn clip_to_ceiling(band: &mut Raster, ceiling: f32) {
    band.mapv_inplace(|v| if v > ceiling { ceiling } else { v });
}

/// Linear stretch of `[floor, ceiling]` onto `[0, 255]`, truncated to 8 bits
pub fn stretch_8bit(band: &Raster, ceiling: f32, floor: f32) -> PrepResult<Array2<u8>> {
    if !ceiling.is_finite() || !floor.is_finite() {
        return Err(PrepError::Numeric(format!(
            "Non-finite stretch bounds: floor {}, ceiling {}",
            floor, ceiling
        )));
    }
    if ceiling <= floor {
        return Err(PrepError::Numeric(format!(
            "Stretch ceiling {} must exceed floor {}",
            ceiling, floor
        )));
    }

    let floor = floor as f64;
    let range = ceiling as f64 - floor;
    Ok(band.mapv(|v| {
        let t = (v as f64 - floor) * BYTE_MAX as f64 / range;
        t.clamp(0.0, BYTE_MAX as f64) as u8
    }))
}

/// Rescale an 8-bit image to floating point `[0, 1]`
pub fn to_unit_range(stretched: &Array2<u8>) -> Raster {
    stretched.mapv(|v| v as f32 / BYTE_MAX)
}

/// Stretch then rescale, the form consumed by the model
pub fn normalize_band(band: &Raster, ceiling: f32, floor: f32) -> PrepResult<Raster> {
    Ok(to_unit_range(&stretch_8bit(band, ceiling, floor)?))
}

/// Percentile `q` (0..=100) with linear interpolation between closest ranks
pub fn percentile(band: &Raster, q: f64) -> PrepResult<f32> {
    if !(0.0..=100.0).contains(&q) {
        return Err(PrepError::Numeric(format!("Percentile {} outside 0..=100", q)));
    }

    let mut values: Vec<f32> = band.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Err(PrepError::Numeric(
            "Cannot take a percentile of a band with no finite values".to_string(),
        ));
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));

    let rank = q / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    let value = values[lower] as f64 + (values[upper] as f64 - values[lower] as f64) * fraction;

    Ok(value as f32)
}

/// Applies a stretch policy using a band configuration
#[derive(Debug, Clone)]
pub struct Normalizer {
    bands: BandConfig,
    policy: StretchPolicy,
}

impl Normalizer {
    pub fn new(bands: BandConfig, policy: StretchPolicy) -> PrepResult<Self> {
        bands.validate()?;
        policy.validate()?;
        Ok(Self { bands, policy })
    }

    pub fn policy(&self) -> StretchPolicy {
        self.policy
    }

    pub fn bands(&self) -> &BandConfig {
        &self.bands
    }

    /// Saturation clipping applied to raw values before histogram matching
    pub fn clip_raw(&self, band_id: &str, band: &mut Raster) -> PrepResult<()> {
        if let StretchPolicy::Ceiling = self.policy {
            clip_to_ceiling(band, self.bands.ceiling(band_id)?);
        }
        Ok(())
    }

    /// Stretch bounds used for this band under the current policy
    pub fn bounds(&self, band_id: &str, band: &Raster) -> PrepResult<(f32, f32)> {
        match self.policy {
            StretchPolicy::Ceiling => Ok((self.bands.floor, self.bands.ceiling(band_id)?)),
            StretchPolicy::Percentile { low, high } => {
                Ok((percentile(band, low)?, percentile(band, high)?))
            }
        }
    }

    pub fn normalize(&self, band_id: &str, band: &Raster) -> PrepResult<Raster> {
        let (floor, ceiling) = self.bounds(band_id, band)?;
        log::debug!("Stretching {} over [{}, {}]", band_id, floor, ceiling);
        normalize_band(band, ceiling, floor).map_err(|e| match e {
            PrepError::Numeric(msg) => PrepError::Numeric(format!("Band {}: {}", band_id, msg)),
            other => other,
        })
    }
}
