use crate::types::{ChannelCode, DomainType, GoesError, GoesResult};
use ndarray::Array2;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolution a channel is brought to, relative to its native grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRequirement {
    Native,
    Upscale2x,
    Upscale4x,
}

impl ResolutionRequirement {
    pub fn zoom_factor(self) -> f64 {
        match self {
            ResolutionRequirement::Native => 1.0,
            ResolutionRequirement::Upscale2x => 2.0,
            ResolutionRequirement::Upscale4x => 4.0,
        }
    }
}

/// Requirement for a channel in a given sector. Full disk keeps everything native.
pub fn requirement_for(domain: DomainType, code: ChannelCode) -> ResolutionRequirement {
    if domain == DomainType::FullDisk {
        return ResolutionRequirement::Native;
    }
    match code.band() {
        2 | 4 | 9 | 16 => ResolutionRequirement::Native,
        1 | 3 | 5 => ResolutionRequirement::Upscale2x,
        6 | 7 | 8 | 10..=15 => ResolutionRequirement::Upscale4x,
        _ => ResolutionRequirement::Native,
    }
}

/// `round(native * zoom)` per axis
pub fn target_shape(native: (usize, usize), zoom: f64) -> (usize, usize) {
    (
        (native.0 as f64 * zoom).round() as usize,
        (native.1 as f64 * zoom).round() as usize,
    )
}

/// Scene reference grid: C02's native shape, else the largest one present
pub fn reference_shape(native_shapes: &BTreeMap<ChannelCode, (usize, usize)>) -> Option<(usize, usize)> {
    if let Some(shape) = native_shapes.get(&ChannelCode::C02) {
        return Some(*shape);
    }
    native_shapes.values().copied().max_by_key(|(r, c)| r * c)
}

/// Pixel replication by an exact integer factor
pub fn replicate_to<T: Copy>(array: &Array2<T>, target: (usize, usize)) -> GoesResult<Array2<T>> {
    let (rows, cols) = array.dim();
    let mismatch = || GoesError::ResamplingShapeMismatch {
        from: (rows, cols),
        to: target,
    };
    if rows == 0 || cols == 0 || target.0 % rows != 0 || target.1 % cols != 0 {
        return Err(mismatch());
    }
    let (fy, fx) = (target.0 / rows, target.1 / cols);
    if fy != fx || fy == 0 {
        return Err(mismatch());
    }
    Ok(Array2::from_shape_fn(target, |(r, c)| array[[r / fy, c / fx]]))
}

/// Bilinear resize with pixel centers aligned
pub fn bilinear_to<T: Float>(array: &Array2<T>, target: (usize, usize)) -> Array2<T> {
    let (rows, cols) = array.dim();
    if rows == 0 || cols == 0 || target.0 == 0 || target.1 == 0 {
        return Array2::from_elem(target, T::nan());
    }
    let sy = rows as f64 / target.0 as f64;
    let sx = cols as f64 / target.1 as f64;

    Array2::from_shape_fn(target, |(r, c)| {
        let y = ((r as f64 + 0.5) * sy - 0.5).clamp(0.0, (rows - 1) as f64);
        let x = ((c as f64 + 0.5) * sx - 0.5).clamp(0.0, (cols - 1) as f64);
        sample_bilinear(array, y, x)
    })
}

/// Bilinear resize with corner samples aligned (first and last rows/columns
/// map exactly onto the source edges)
pub fn zoom_bilinear<T: Float>(array: &Array2<T>, target: (usize, usize)) -> Array2<T> {
    let (rows, cols) = array.dim();
    if rows == 0 || cols == 0 || target.0 == 0 || target.1 == 0 {
        return Array2::from_elem(target, T::nan());
    }
    let scale = |src: usize, dst: usize| {
        if dst > 1 {
            (src - 1) as f64 / (dst - 1) as f64
        } else {
            0.0
        }
    };
    let sy = scale(rows, target.0);
    let sx = scale(cols, target.1);

    Array2::from_shape_fn(target, |(r, c)| sample_bilinear(array, r as f64 * sy, c as f64 * sx))
}

#[inline]
fn sample_bilinear<T: Float>(array: &Array2<T>, y: f64, x: f64) -> T {
    let (rows, cols) = array.dim();
    let y0 = (y.floor() as usize).min(rows - 1);
    let x0 = (x.floor() as usize).min(cols - 1);
    let y1 = (y0 + 1).min(rows - 1);
    let x1 = (x0 + 1).min(cols - 1);
    let fy = T::from(y - y0 as f64).unwrap_or_else(T::zero);
    let fx = T::from(x - x0 as f64).unwrap_or_else(T::zero);
    let one = T::one();

    let top = array[[y0, x0]] * (one - fx) + array[[y0, x1]] * fx;
    let bottom = array[[y1, x0]] * (one - fx) + array[[y1, x1]] * fx;
    top * (one - fy) + bottom * fy
}

/// Resize to an explicit shape: no-op when equal, replication for exact
/// x2/x4, bilinear otherwise
pub fn resample_to_shape<T: Float>(array: &Array2<T>, target: (usize, usize)) -> Array2<T> {
    let (rows, cols) = array.dim();
    if (rows, cols) == target {
        return array.clone();
    }

    let exact_ratio = rows > 0
        && cols > 0
        && target.0 % rows == 0
        && target.1 % cols == 0
        && target.0 / rows == target.1 / cols
        && matches!(target.0 / rows, 2 | 4);

    if exact_ratio {
        match replicate_to(array, target) {
            Ok(out) => return out,
            Err(e) => log::debug!("{}; using bilinear", e),
        }
    }
    bilinear_to(array, target)
}

/// Resize by a uniform zoom factor
pub fn resample<T: Float>(array: &Array2<T>, zoom: f64) -> Array2<T> {
    if zoom == 1.0 {
        return array.clone();
    }
    resample_to_shape(array, target_shape(array.dim(), zoom))
}

/// Per-sector resolution reconciliation
#[derive(Debug, Clone)]
pub struct ResamplingEngine {
    domain: DomainType,
}

impl ResamplingEngine {
    pub fn new(domain: DomainType) -> Self {
        Self { domain }
    }

    pub fn requirement(&self, code: ChannelCode) -> ResolutionRequirement {
        requirement_for(self.domain, code)
    }

    pub fn target_shape(&self, code: ChannelCode, native: (usize, usize)) -> (usize, usize) {
        target_shape(native, self.requirement(code).zoom_factor())
    }

    pub fn resample_channel(&self, code: ChannelCode, array: &Array2<f32>) -> Array2<f32> {
        let target = self.target_shape(code, array.dim());
        if target != array.dim() {
            log::debug!(
                "{}: {:?} upscale {:?} -> {:?}",
                code,
                self.requirement(code),
                array.dim(),
                target
            );
        }
        resample_to_shape(array, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_requirement_table() {
        use ResolutionRequirement::*;
        assert_eq!(requirement_for(DomainType::Conus, ChannelCode::C02), Native);
        assert_eq!(requirement_for(DomainType::Conus, ChannelCode::C04), Native);
        assert_eq!(requirement_for(DomainType::Mesoscale, ChannelCode::C03), Upscale2x);
        assert_eq!(requirement_for(DomainType::Conus, ChannelCode::C13), Upscale4x);
        assert_eq!(requirement_for(DomainType::Conus, ChannelCode::C06), Upscale4x);
        assert_eq!(requirement_for(DomainType::FullDisk, ChannelCode::C13), Native);
    }

    #[test]
    fn test_target_shape_rounding() {
        assert_eq!(target_shape((3, 5), 2.0), (6, 10));
        assert_eq!(target_shape((3, 5), 1.5), (5, 8));
        assert_eq!(target_shape((3, 5), 1.0), (3, 5));
    }

    #[test]
    fn test_replication_kernel() {
        let a = array![[1.0f32, 2.0], [3.0, 4.0]];
        let up = resample(&a, 2.0);
        assert_eq!(up.dim(), (4, 4));
        assert_eq!(up[[0, 1]], 1.0);
        assert_eq!(up[[1, 2]], 2.0);
        assert_eq!(up[[3, 3]], 4.0);
        assert!(matches!(
            replicate_to(&a, (5, 4)),
            Err(GoesError::ResamplingShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_general_ratio_uses_bilinear() {
        let a = array![[0.0f64, 10.0], [20.0, 30.0]];
        let out = resample(&a, 1.5);
        assert_eq!(out.dim(), (3, 3));
        assert_abs_diff_eq!(out[[1, 1]], 15.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[0, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_identity_zoom() {
        let a = array![[1.5f32, f32::NAN], [3.0, 4.0]];
        let out = resample(&a, 1.0);
        assert_eq!(out[[0, 0]].to_bits(), a[[0, 0]].to_bits());
        assert!(out[[0, 1]].is_nan());
    }

    #[test]
    fn test_zoom_bilinear_corners() {
        let a = array![[0.0f64, 1.0], [2.0, 3.0]];
        let out = zoom_bilinear(&a, (3, 5));
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[2, 4]], 3.0);
        assert_abs_diff_eq!(out[[1, 2]], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_reference_shape() {
        let mut shapes = BTreeMap::new();
        shapes.insert(ChannelCode::C13, (10, 20));
        shapes.insert(ChannelCode::C01, (20, 40));
        assert_eq!(reference_shape(&shapes), Some((20, 40)));
        shapes.insert(ChannelCode::C02, (40, 80));
        assert_eq!(reference_shape(&shapes), Some((40, 80)));
        assert_eq!(reference_shape(&BTreeMap::new()), None);
    }
}
