//! Quantile-based histogram matching for cross-date radiometric harmonization
//!
//! The source image keeps its spatial layout while its value distribution is
//! remapped onto the template's via a piecewise-linear inverse CDF.

use crate::types::{PrepError, PrepResult, Raster};

/// Unique values of a flattened raster together with their run lengths
#[derive(Debug, Clone, PartialEq)]
struct ValueRuns {
    values: Vec<f32>,
    counts: Vec<usize>,
}

impl ValueRuns {
    /// Run-length encode an already sorted slice
    fn from_sorted(sorted: &[f32]) -> Self {
        let mut values = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        for &v in sorted {
            match values.last() {
                Some(&last) if last == v => {
                    if let Some(count) = counts.last_mut() {
                        *count += 1;
                    }
                }
                _ => {
                    values.push(v);
                    counts.push(1);
                }
            }
        }
        Self { values, counts }
    }

    /// Cumulative counts normalized by the total, in single precision
    fn quantiles(&self) -> Vec<f32> {
        let mut cumulative = 0usize;
        let mut quantiles: Vec<f32> = self
            .counts
            .iter()
            .map(|&c| {
                cumulative += c;
                cumulative as f32
            })
            .collect();
        let total = cumulative as f32;
        for q in quantiles.iter_mut() {
            *q /= total;
        }
        quantiles
    }
}

/// Piecewise-linear interpolation of `x` in the table `(xp, fp)`.
///
/// `xp` must be increasing; values outside the table take the end values.
fn interp(x: f64, xp: &[f32], fp: &[f32]) -> f64 {
    let n = xp.len();
    if x <= xp[0] as f64 {
        return fp[0] as f64;
    }
    if x >= xp[n - 1] as f64 {
        return fp[n - 1] as f64;
    }

    // first index with xp[hi] > x; 1 <= hi <= n - 1 given the bounds above
    let hi = xp.partition_point(|&v| (v as f64) <= x);
    let lo = hi - 1;
    let (x0, x1) = (xp[lo] as f64, xp[hi] as f64);
    let (y0, y1) = (fp[lo] as f64, fp[hi] as f64);
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

fn check_finite(name: &str, raster: &Raster) -> PrepResult<()> {
    if raster.is_empty() {
        return Err(PrepError::Numeric(format!("Histogram match {} is empty", name)));
    }
    if raster.iter().any(|v| !v.is_finite()) {
        return Err(PrepError::Numeric(format!(
            "Histogram match {} contains non-finite values",
            name
        )));
    }
    Ok(())
}

/// Remap `source` so that its value distribution matches `template`.
///
/// The two rasters may differ in shape. Equal source values always map to
/// equal outputs, and every output lies within the template's value range.
pub fn match_histogram(source: &Raster, template: &Raster) -> PrepResult<Raster> {
    check_finite("source", source)?;
    check_finite("template", template)?;

    let shape = source.dim();
    let flat: Vec<f32> = source.iter().copied().collect();

    let mut perm: Vec<usize> = (0..flat.len()).collect();
    perm.sort_unstable_by(|&a, &b| flat[a].total_cmp(&flat[b]));

    // Inverse index: position in the source -> index of its unique-value run
    let mut run_of = vec![0usize; flat.len()];
    let mut source_sorted = Vec::with_capacity(flat.len());
    let mut run = 0usize;
    for (k, &pos) in perm.iter().enumerate() {
        if k > 0 && flat[pos] != flat[perm[k - 1]] {
            run += 1;
        }
        run_of[pos] = run;
        source_sorted.push(flat[pos]);
    }
    let source_runs = ValueRuns::from_sorted(&source_sorted);

    let mut template_sorted: Vec<f32> = template.iter().copied().collect();
    template_sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let template_runs = ValueRuns::from_sorted(&template_sorted);

    if template_runs.values.len() == 1 {
        log::warn!(
            "Histogram match template is constant ({}); output will be constant",
            template_runs.values[0]
        );
    }

    let source_quantiles = source_runs.quantiles();
    let template_quantiles = template_runs.quantiles();

    let mapped: Vec<f32> = source_quantiles
        .iter()
        .map(|&q| interp(q as f64, &template_quantiles, &template_runs.values) as f32)
        .collect();

    log::debug!(
        "Matched {} source levels onto {} template levels",
        source_runs.values.len(),
        template_runs.values.len()
    );

    let matched: Vec<f32> = run_of.into_iter().map(|r| mapped[r]).collect();
    Raster::from_shape_vec(shape, matched)
        .map_err(|e| PrepError::Processing(format!("Failed to reshape matched band: {}", e)))
}
