//! Cloud-shadow tracing.
//!
//! From every clear pixel a ray is walked towards the sun. A cloud pixel on
//! the ray casts a shadow onto the origin when the height of the sun ray above
//! the origin at that distance lies between the cloud base and the cloud top
//! (both widened by a tolerance). Two follow-up passes fill enclosed gaps
//! (islands) and grow the shadow by one pixel (belt).

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::core::constants::EARTH_RADIUS_M;
use crate::core::postprocess::{clamped_window, rewrite_region};
use crate::types::{CirrusError, CirrusResult, ClassificationFlags, Rect};

/// Empirical cloud-geometry policy of the shadow search, in meters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudShadowParams {
    /// Subtracted from the lowest neighbouring cloud top to estimate the cloud base
    pub base_offset_m: f64,
    /// Lower bound of the estimated cloud base
    pub min_cloud_base_m: f64,
    /// Widening of the [base, top] interval on both ends
    pub height_tolerance_m: f64,
    /// Ray length in pixels
    pub max_search_pixels: usize,
}

impl Default for CloudShadowParams {
    fn default() -> Self {
        Self {
            base_offset_m: 300.0,
            min_cloud_base_m: 300.0,
            height_tolerance_m: 300.0,
            max_search_pixels: 64,
        }
    }
}

impl CloudShadowParams {
    pub fn validate(&self) -> CirrusResult<()> {
        let finite = [self.base_offset_m, self.min_cloud_base_m, self.height_tolerance_m]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        if !finite || self.max_search_pixels == 0 {
            return Err(CirrusError::Configuration(format!(
                "invalid cloud shadow parameters {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Per-pixel rasters the tracer reads, all in the flag raster's frame
#[derive(Debug, Clone, Copy)]
pub struct ShadowInputs<'a> {
    pub latitude: ArrayView2<'a, f32>,
    pub longitude: ArrayView2<'a, f32>,
    pub sun_zenith: ArrayView2<'a, f32>,
    /// Degrees clockwise from north, as seen from the pixel
    pub sun_azimuth: ArrayView2<'a, f32>,
    /// Cloud-top height above sea level, meters; NaN where unknown
    pub cloud_top_height: ArrayView2<'a, f32>,
    /// Surface elevation in meters, sea level when absent
    pub elevation: Option<ArrayView2<'a, f32>>,
}

impl<'a> ShadowInputs<'a> {
    pub fn check_dim(&self, dim: (usize, usize)) -> CirrusResult<()> {
        let mut shapes = vec![
            ("latitude", self.latitude.dim()),
            ("longitude", self.longitude.dim()),
            ("sun_zenith", self.sun_zenith.dim()),
            ("sun_azimuth", self.sun_azimuth.dim()),
            ("cloud_top_height", self.cloud_top_height.dim()),
        ];
        if let Some(e) = &self.elevation {
            shapes.push(("elevation", e.dim()));
        }
        match shapes.iter().find(|(_, d)| *d != dim) {
            Some((name, d)) => Err(CirrusError::DimensionMismatch(format!(
                "{} raster is {:?}, flags are {:?}",
                name, d, dim
            ))),
            None => Ok(()),
        }
    }

    /// Pixel steps (dx, dy) per meter travelled along `azimuth_deg`, from a
    /// local finite-difference Jacobian of the geolocation
    fn pixel_direction(&self, y: usize, x: usize, azimuth_deg: f64) -> Option<(f64, f64)> {
        let (rows, cols) = self.latitude.dim();
        let (x0, x1) = (x.saturating_sub(1), (x + 1).min(cols - 1));
        let (y0, y1) = (y.saturating_sub(1), (y + 1).min(rows - 1));
        if x1 == x0 || y1 == y0 {
            return None;
        }

        let lat = |yy: usize, xx: usize| self.latitude[[yy, xx]] as f64;
        let lon = |yy: usize, xx: usize| self.longitude[[yy, xx]] as f64;
        let m_per_deg = EARTH_RADIUS_M.to_radians();
        let cos_lat = lat(y, x).to_radians().cos();

        let east = |dlon: f64| crate::core::geometry::wrap_degrees(dlon) * cos_lat * m_per_deg;
        let north = |dlat: f64| dlat * m_per_deg;

        let span_x = (x1 - x0) as f64;
        let span_y = (y1 - y0) as f64;
        // meters per pixel step along x and along y
        let ex = (east(lon(y, x1) - lon(y, x0)) / span_x, north(lat(y, x1) - lat(y, x0)) / span_x);
        let ey = (east(lon(y1, x) - lon(y0, x)) / span_y, north(lat(y1, x) - lat(y0, x)) / span_y);

        let det = ex.0 * ey.1 - ey.0 * ex.1;
        if !det.is_finite() || det.abs() < 1e-9 {
            return None;
        }
        let az = azimuth_deg.to_radians();
        let (ue, un) = (az.sin(), az.cos());
        Some(((ue * ey.1 - ey.0 * un) / det, (ex.0 * un - ue * ex.1) / det))
    }
}

fn finite(v: f32) -> Option<f64> {
    v.is_finite().then_some(v as f64)
}

/// Marks CLOUD_SHADOW on clear pixels of `region` shadowed by a cloud along the sun ray
pub fn trace_cloud_shadow(
    flags: &Array2<ClassificationFlags>,
    inputs: &ShadowInputs,
    region: Rect,
    params: &CloudShadowParams,
) -> Array2<ClassificationFlags> {
    let (rows, cols) = flags.dim();

    let max_top = inputs
        .cloud_top_height
        .iter()
        .zip(flags.iter())
        .filter(|(_, f)| f.is_cloud())
        .filter_map(|(h, _)| finite(*h))
        .fold(f64::NEG_INFINITY, f64::max);
    if !max_top.is_finite() {
        log::debug!("No cloud with a known top height, skipping shadow tracing");
        return flags.clone();
    }
    let ceiling = max_top + params.height_tolerance_m;

    // estimated cloud base from the lowest known top in the 3x3 window
    let cloud_base = |y: usize, x: usize| -> f64 {
        let lowest = clamped_window((rows, cols), y, x, 1)
            .filter_map(|(ny, nx)| finite(inputs.cloud_top_height[[ny, nx]]))
            .fold(f64::INFINITY, f64::min);
        (lowest - params.base_offset_m).max(params.min_cloud_base_m)
    };

    rewrite_region(flags, region, |y, x, mut px| {
        if !px.is_clear() {
            return px;
        }
        let (Some(sza), Some(saz)) = (finite(inputs.sun_zenith[[y, x]]), finite(inputs.sun_azimuth[[y, x]])) else {
            return px;
        };
        if sza <= 0.0 || sza >= 90.0 {
            return px;
        }
        let Some((dx, dy)) = inputs.pixel_direction(y, x, saz) else {
            return px;
        };
        let step = dx.abs().max(dy.abs());
        if step <= 0.0 {
            return px;
        }
        let (sx, sy) = (dx / step, dy / step);
        let meters_per_step = 1.0 / step;

        let ground = inputs
            .elevation
            .as_ref()
            .and_then(|e| finite(e[[y, x]]))
            .unwrap_or(0.0);
        let tan_sza = sza.to_radians().tan();

        let mut previous = (y, x);
        for k in 1..=params.max_search_pixels {
            let fx = (x as f64 + k as f64 * sx).round();
            let fy = (y as f64 + k as f64 * sy).round();
            if fx < 0.0 || fy < 0.0 || fx >= cols as f64 || fy >= rows as f64 {
                break;
            }
            let (hy, hx) = (fy as usize, fx as usize);
            if (hy, hx) == previous {
                continue;
            }
            previous = (hy, hx);

            let sun_height = ground + k as f64 * meters_per_step / tan_sza;
            if sun_height > ceiling {
                break;
            }

            let hit = flags[[hy, hx]];
            if !hit.is_cloud() || hit.contains(ClassificationFlags::COASTLINE) {
                continue;
            }
            let Some(top) = finite(inputs.cloud_top_height[[hy, hx]]) else {
                continue;
            };
            let base = cloud_base(hy, hx);
            if sun_height >= base - params.height_tolerance_m
                && sun_height <= top + params.height_tolerance_m
            {
                px.insert(ClassificationFlags::CLOUD_SHADOW);
                break;
            }
        }
        px
    })
}

/// Shadows clear pixels whose neighbours are all cloud or shadow, at least one being shadow
pub fn fill_shadow_islands(flags: &Array2<ClassificationFlags>, region: Rect) -> Array2<ClassificationFlags> {
    let dim = flags.dim();
    rewrite_region(flags, region, |y, x, mut px| {
        if !px.is_clear() {
            return px;
        }
        let mut enclosed = true;
        let mut any_shadow = false;
        for (ny, nx) in clamped_window(dim, y, x, 1).filter(|&p| p != (y, x)) {
            let n = flags[[ny, nx]];
            let shadow = n.contains(ClassificationFlags::CLOUD_SHADOW);
            any_shadow |= shadow;
            enclosed &= shadow || n.is_cloud();
        }
        if enclosed && any_shadow {
            px.insert(ClassificationFlags::CLOUD_SHADOW);
        }
        px
    })
}

/// Shadows every clear pixel with at least one shadow neighbour
pub fn grow_shadow_belt(flags: &Array2<ClassificationFlags>, region: Rect) -> Array2<ClassificationFlags> {
    let dim = flags.dim();
    rewrite_region(flags, region, |y, x, mut px| {
        if !px.is_clear() {
            return px;
        }
        let touches = clamped_window(dim, y, x, 1)
            .filter(|&p| p != (y, x))
            .any(|(ny, nx)| flags[[ny, nx]].contains(ClassificationFlags::CLOUD_SHADOW));
        if touches {
            px.insert(ClassificationFlags::CLOUD_SHADOW);
        }
        px
    })
}
