//! Row-parallel raster fill helpers shared by enhancement and compositing

use ndarray::{Array2, Array3, Axis};

/// Build a (rows, cols, 3) image by evaluating `pixel(row, col)` everywhere
pub fn render_rgb<F>(rows: usize, cols: usize, pixel: F) -> Array3<u8>
where
    F: Fn(usize, usize) -> [u8; 3] + Sync + Send,
{
    let mut image = Array3::<u8>::zeros((rows, cols, 3));

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        image
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(r, mut row)| {
                for c in 0..cols {
                    let rgb = pixel(r, c);
                    row[[c, 0]] = rgb[0];
                    row[[c, 1]] = rgb[1];
                    row[[c, 2]] = rgb[2];
                }
            });
    }

    #[cfg(not(feature = "parallel"))]
    for (r, mut row) in image.axis_iter_mut(Axis(0)).enumerate() {
        for c in 0..cols {
            let rgb = pixel(r, c);
            row[[c, 0]] = rgb[0];
            row[[c, 1]] = rgb[1];
            row[[c, 2]] = rgb[2];
        }
    }

    image
}

/// Single-band counterpart of [`render_rgb`]
pub fn render_gray<F>(rows: usize, cols: usize, pixel: F) -> Array2<u8>
where
    F: Fn(usize, usize) -> u8 + Sync + Send,
{
    let mut image = Array2::<u8>::zeros((rows, cols));

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        image
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(r, mut row)| {
                for c in 0..cols {
                    row[c] = pixel(r, c);
                }
            });
    }

    #[cfg(not(feature = "parallel"))]
    for (r, mut row) in image.axis_iter_mut(Axis(0)).enumerate() {
        for c in 0..cols {
            row[c] = pixel(r, c);
        }
    }

    image
}

/// Unit-interval value to a byte, NaN as 0
#[inline]
pub fn unit_to_u8(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// Clip `(value - lo) / (hi - lo)` to [0, 1]; a reversed range inverts the ramp
#[inline]
pub fn normalize(value: f32, lo: f32, hi: f32) -> f32 {
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}
