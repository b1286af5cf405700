//! Coastline-proximity refinement.
//!
//! Land/water mixed pixels produce spurious cloud and snow detections. A
//! pixel is near the coast when its window holds a COASTLINE pixel or a
//! differing water fraction. Near-coast pixels lose SNOW_ICE, and lose their
//! cloud bits unless the window is mostly cloud or an inland/offshore
//! neighbour is independently cloudy.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::core::postprocess::{clamped_window, rewrite_region};
use crate::types::{CirrusError, CirrusResult, ClassificationFlags, Rect};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoastlineParams {
    /// Neighbourhood radius, 1 gives the 3x3 window
    pub window_radius: usize,
    /// Cloud share of the window (centre included) above which a pixel counts as surrounded
    pub surrounded_fraction: f64,
}

impl Default for CoastlineParams {
    fn default() -> Self {
        Self {
            window_radius: 1,
            surrounded_fraction: 0.7,
        }
    }
}

impl CoastlineParams {
    pub fn validate(&self) -> CirrusResult<()> {
        if self.window_radius == 0 {
            return Err(CirrusError::Configuration(
                "coastline window radius must be at least 1".to_string(),
            ));
        }
        if !(self.surrounded_fraction > 0.0 && self.surrounded_fraction <= 1.0) {
            return Err(CirrusError::Configuration(format!(
                "surrounded fraction {} outside (0, 1]",
                self.surrounded_fraction
            )));
        }
        Ok(())
    }
}

/// Refines the pixels of `region`, reading `flags` and `water_fraction` as frozen inputs.
///
/// Window positions outside the raster are clamped to the nearest edge pixel.
pub fn refine_coastline(
    flags: &Array2<ClassificationFlags>,
    water_fraction: Option<ArrayView2<u8>>,
    region: Rect,
    params: &CoastlineParams,
) -> Array2<ClassificationFlags> {
    let dim = flags.dim();
    let radius = params.window_radius;

    rewrite_region(flags, region, |y, x, mut px| {
        if px.is_invalid() {
            return px;
        }
        let centre_wf = water_fraction.as_ref().map(|wf| wf[[y, x]]);

        let mut near_coast = px.contains(ClassificationFlags::COASTLINE);
        let mut samples = 0usize;
        let mut cloudy = 0usize;
        let mut independent_cloud = false;

        for (ny, nx) in clamped_window(dim, y, x, radius) {
            let neighbour = flags[[ny, nx]];
            samples += 1;
            if neighbour.is_cloud() {
                cloudy += 1;
            }
            if (ny, nx) == (y, x) {
                continue;
            }
            let coastal = neighbour.contains(ClassificationFlags::COASTLINE);
            let differs = match (&water_fraction, centre_wf) {
                (Some(wf), Some(c)) => wf[[ny, nx]] != c,
                _ => false,
            };
            near_coast |= coastal || differs;
            independent_cloud |= neighbour.is_cloud() && !coastal;
        }

        if !near_coast {
            return px;
        }
        px.remove(ClassificationFlags::SNOW_ICE);

        let surrounded = cloudy as f64 >= params.surrounded_fraction * samples as f64;
        if px.is_cloud() && !surrounded && !independent_cloud {
            px.remove(ClassificationFlags::ANY_CLOUD);
        }
        px
    })
}
