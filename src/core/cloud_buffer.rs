//! Cloud buffering: a Chebyshev-radius margin around cloud pixels.

use ndarray::Array2;

use crate::core::postprocess::rewrite_region;
use crate::types::{ClassificationFlags, Rect};

/// Sets CLOUD_BUFFER on every valid, non-land, non-cloud pixel of `region`
/// that has a CLOUD pixel within Chebyshev distance `width`.
///
/// Reads `flags` as a frozen snapshot; the neighbourhood is clipped to the
/// raster, so the result inside `region` only depends on pixels within
/// `width` of it.
pub fn apply_cloud_buffer(
    flags: &Array2<ClassificationFlags>,
    region: Rect,
    width: usize,
) -> Array2<ClassificationFlags> {
    if width == 0 {
        return flags.clone();
    }
    let (rows, cols) = flags.dim();

    rewrite_region(flags, region, |y, x, mut px| {
        if px.is_cloud() || px.is_invalid() || px.contains(ClassificationFlags::LAND) {
            return px;
        }
        let y0 = y.saturating_sub(width);
        let y1 = (y + width + 1).min(rows);
        let x0 = x.saturating_sub(width);
        let x1 = (x + width + 1).min(cols);

        let near_cloud = (y0..y1).any(|ny| (x0..x1).any(|nx| flags[[ny, nx]].is_cloud()));
        if near_cloud {
            px.insert(ClassificationFlags::CLOUD_BUFFER);
        }
        px
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_skips_land_and_cloud() {
        let mut flags = Array2::from_elem((7, 7), ClassificationFlags::NONE);
        flags[[3, 3]] = ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_SURE;
        flags[[3, 4]] = ClassificationFlags::LAND;
        flags[[2, 2]] = ClassificationFlags::INVALID;

        let out = apply_cloud_buffer(&flags, Rect::from_dim(flags.dim()), 1);
        assert!(out[[4, 4]].contains(ClassificationFlags::CLOUD_BUFFER));
        assert!(!out[[3, 4]].contains(ClassificationFlags::CLOUD_BUFFER));
        assert!(!out[[3, 3]].contains(ClassificationFlags::CLOUD_BUFFER));
        assert_eq!(out[[2, 2]], ClassificationFlags::INVALID);
        assert!(!out[[5, 5]].contains(ClassificationFlags::CLOUD_BUFFER));
    }

    #[test]
    fn test_zero_width_is_identity() {
        let mut flags = Array2::from_elem((3, 3), ClassificationFlags::NONE);
        flags[[1, 1]] = ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_AMBIGUOUS;
        assert_eq!(apply_cloud_buffer(&flags, Rect::from_dim((3, 3)), 0), flags);
    }

    #[test]
    fn test_only_region_written() {
        let mut flags = Array2::from_elem((5, 5), ClassificationFlags::NONE);
        flags[[2, 2]] = ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_SURE;
        let out = apply_cloud_buffer(&flags, Rect::new(0, 0, 2, 5), 1);
        assert!(out[[1, 1]].contains(ClassificationFlags::CLOUD_BUFFER));
        assert!(!out[[1, 3]].contains(ClassificationFlags::CLOUD_BUFFER));
    }
}
