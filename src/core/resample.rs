use crate::types::{PrepError, PrepResult, Raster};
use ndarray::{Array2, ArrayViewMut1};

/// Source coordinate and blend weight for one output index along an axis
#[derive(Debug, Clone, Copy)]
struct Tap {
    lo: usize,
    hi: usize,
    weight: f32,
}

/// Pixel-centre aligned taps: `src = (dst + 0.5) * in / out - 0.5`, clamped to the edges
fn axis_taps(input_len: usize, output_len: usize) -> Vec<Tap> {
    let scale = input_len as f64 / output_len as f64;
    (0..output_len)
        .map(|dst| {
            let src = ((dst as f64 + 0.5) * scale - 0.5).max(0.0);
            let lo = (src.floor() as usize).min(input_len - 1);
            let hi = (lo + 1).min(input_len - 1);
            let weight = if hi == lo { 0.0 } else { (src - lo as f64) as f32 };
            Tap { lo, hi, weight }
        })
        .collect()
}

fn fill_row(band: &Raster, row_tap: Tap, col_taps: &[Tap], mut out_row: ArrayViewMut1<f32>) {
    for (col, tap) in col_taps.iter().enumerate() {
        let v11 = band[[row_tap.lo, tap.lo]];
        let v12 = band[[row_tap.lo, tap.hi]];
        let v21 = band[[row_tap.hi, tap.lo]];
        let v22 = band[[row_tap.hi, tap.hi]];

        let top = v11 + (v12 - v11) * tap.weight;
        let bottom = v21 + (v22 - v21) * tap.weight;
        out_row[col] = top + (bottom - top) * row_tap.weight;
    }
}

/// Resize a band to `target_shape` (height, width) using bilinear interpolation
pub fn resize_bilinear(band: &Raster, target_shape: (usize, usize)) -> PrepResult<Raster> {
    let (height, width) = band.dim();
    let (target_height, target_width) = target_shape;

    if height == 0 || width == 0 || target_height == 0 || target_width == 0 {
        return Err(PrepError::Processing(format!(
            "Cannot resize {}x{} band to {}x{}",
            height, width, target_height, target_width
        )));
    }
    if band.dim() == target_shape {
        return Ok(band.clone());
    }

    log::debug!(
        "Resizing band {}x{} -> {}x{}",
        height, width, target_height, target_width
    );

    let row_taps = axis_taps(height, target_height);
    let col_taps = axis_taps(width, target_width);
    let mut resized = Array2::<f32>::zeros(target_shape);

    #[cfg(feature = "parallel")]
    {
        use ndarray::parallel::prelude::*;
        use ndarray::Axis;

        resized
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, out_row)| fill_row(band, row_taps[row], &col_taps, out_row));
    }

    #[cfg(not(feature = "parallel"))]
    {
        for (row, out_row) in resized.rows_mut().into_iter().enumerate() {
            fill_row(band, row_taps[row], &col_taps, out_row);
        }
    }

    Ok(resized)
}
