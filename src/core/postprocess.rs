//! Raster-level post-processing of the classification flags.
//!
//! Passes never update the raster they read: each pass takes a frozen
//! snapshot and returns a new raster in which only its write region has
//! changed. The passes run in two ordered phases:
//!
//! 1. coastline refinement, then cloud buffering
//! 2. cloud-shadow tracing, island fill, then belt growth
//!
//! Write regions shrink from pass to pass so that the pixels of the target
//! rectangle come out identical whether the whole scene or a tile plus
//! [`SpatialPostProcessor::required_halo`] pixels of context is processed.

use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::core::cloud_buffer::apply_cloud_buffer;
use crate::core::cloud_shadow::{
    fill_shadow_islands, grow_shadow_belt, trace_cloud_shadow, CloudShadowParams, ShadowInputs,
};
use crate::core::coastline::{refine_coastline, CoastlineParams};
use crate::maybe_rayon::*;
use crate::types::{CirrusError, CirrusResult, ClassificationFlags, Rect};

/// Window coordinates around (y, x), positions outside the raster clamped to the edge.
///
/// Yields `(2r+1)^2` coordinates; near edges some repeat.
pub(crate) fn clamped_window(
    dim: (usize, usize),
    y: usize,
    x: usize,
    radius: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let r = radius as isize;
    let (rows, cols) = (dim.0 as isize, dim.1 as isize);
    let (cy, cx) = (y as isize, x as isize);
    (-r..=r).flat_map(move |dy| {
        (-r..=r).map(move |dx| {
            (
                (cy + dy).clamp(0, rows - 1) as usize,
                (cx + dx).clamp(0, cols - 1) as usize,
            )
        })
    })
}

/// Copies `snapshot` and recomputes every pixel of `region` as `f(y, x, old)`.
///
/// Rows are processed in parallel; `f` may read any pixel of the snapshot.
pub(crate) fn rewrite_region<F>(
    snapshot: &Array2<ClassificationFlags>,
    region: Rect,
    f: F,
) -> Array2<ClassificationFlags>
where
    F: Fn(usize, usize, ClassificationFlags) -> ClassificationFlags + Sync + Send,
{
    let mut output = snapshot.clone();
    if region.is_empty() {
        return output;
    }
    output
        .slice_mut(s![region.y..region.y_end(), region.x..region.x_end()])
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let y = region.y + i;
            for (j, px) in row.iter_mut().enumerate() {
                *px = f(y, region.x + j, *px);
            }
        });
    output
}

/// Which passes run and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessParams {
    pub cloud_buffer_width: usize,
    pub refine_coastline: bool,
    pub cloud_shadow: bool,
    pub coastline: CoastlineParams,
    pub shadow: CloudShadowParams,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        Self {
            cloud_buffer_width: 2,
            refine_coastline: true,
            cloud_shadow: false,
            coastline: CoastlineParams::default(),
            shadow: CloudShadowParams::default(),
        }
    }
}

/// Auxiliary rasters read by the passes, in the flag raster's frame
#[derive(Debug, Clone, Copy, Default)]
pub struct PostProcessContext<'a> {
    pub water_fraction: Option<ArrayView2<'a, u8>>,
    pub shadow: Option<ShadowInputs<'a>>,
}

/// Pixel counts reported after post-processing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostProcessSummary {
    pub coastal_clouds_removed: usize,
    pub buffered: usize,
    pub shadowed: usize,
}

pub struct SpatialPostProcessor {
    params: PostProcessParams,
}

impl SpatialPostProcessor {
    pub fn new(params: PostProcessParams) -> CirrusResult<Self> {
        params.coastline.validate()?;
        if params.cloud_shadow {
            params.shadow.validate()?;
        }
        Ok(Self { params })
    }

    pub fn standard() -> Self {
        Self {
            params: PostProcessParams::default(),
        }
    }

    pub fn params(&self) -> &PostProcessParams {
        &self.params
    }

    fn shadow_reach(&self) -> usize {
        if self.params.cloud_shadow {
            // islands and belt add one pixel each on top of the ray
            self.params.shadow.max_search_pixels + 2
        } else {
            0
        }
    }

    fn coastline_radius(&self) -> usize {
        if self.params.refine_coastline {
            self.params.coastline.window_radius
        } else {
            0
        }
    }

    /// Context pixels needed around a tile for tile results to match whole-scene results
    pub fn required_halo(&self) -> usize {
        let reach = self.params.cloud_buffer_width.max(self.shadow_reach());
        // the cloud-top window of a ray hit reaches one pixel further than the flags
        let window = if self.params.cloud_shadow { 1 } else { 0 };
        reach + self.coastline_radius().max(window).max(1)
    }

    /// Runs both phases over `flags` and returns the processed raster.
    ///
    /// Only pixels inside `target` are final; pixels of the surrounding halo
    /// are context and may be left partially processed.
    pub fn process(
        &self,
        flags: Array2<ClassificationFlags>,
        ctx: &PostProcessContext,
        target: Rect,
    ) -> CirrusResult<Array2<ClassificationFlags>> {
        let dim = flags.dim();
        let bounds = Rect::from_dim(dim);
        if !bounds.encloses(&target) {
            return Err(CirrusError::DimensionMismatch(format!(
                "target {:?} outside flag raster {:?}",
                target, dim
            )));
        }
        if let Some(wf) = &ctx.water_fraction {
            if wf.dim() != dim {
                return Err(CirrusError::DimensionMismatch(format!(
                    "water fraction raster is {:?}, flags are {:?}",
                    wf.dim(),
                    dim
                )));
            }
        }
        let shadow_inputs = match (&ctx.shadow, self.params.cloud_shadow) {
            (Some(inputs), true) => {
                inputs.check_dim(dim)?;
                Some(inputs)
            }
            (None, true) => {
                return Err(CirrusError::Configuration(
                    "cloud shadow enabled without shadow inputs".to_string(),
                ))
            }
            (_, false) => None,
        };

        log::info!(
            "Post-processing {}x{} target in {}x{} raster",
            target.height,
            target.width,
            dim.0,
            dim.1
        );
        let mut summary = PostProcessSummary::default();
        let reach = self.params.cloud_buffer_width.max(self.shadow_reach());

        // Phase 1: coastline, then buffer
        let mut phase1 = flags;
        if self.params.refine_coastline {
            let region = target.expand(reach, &bounds);
            let refined = refine_coastline(&phase1, ctx.water_fraction, region, &self.params.coastline);
            summary.coastal_clouds_removed = count_lost(&phase1, &refined, target, ClassificationFlags::CLOUD);
            phase1 = refined;
            log::debug!("Coastline refinement over {:?}", region);
        }
        if self.params.cloud_buffer_width > 0 {
            let buffered = apply_cloud_buffer(&phase1, target, self.params.cloud_buffer_width);
            summary.buffered = count_gained(&phase1, &buffered, target, ClassificationFlags::CLOUD_BUFFER);
            phase1 = buffered;
        }

        // Phase 2: shadow, islands, belt
        let mut phase2 = phase1;
        if let Some(inputs) = shadow_inputs {
            let before = phase2.clone();
            let traced = trace_cloud_shadow(&phase2, inputs, target.expand(2, &bounds), &self.params.shadow);
            let islands = fill_shadow_islands(&traced, target.expand(1, &bounds));
            phase2 = grow_shadow_belt(&islands, target);
            summary.shadowed = count_gained(&before, &phase2, target, ClassificationFlags::CLOUD_SHADOW);
        }

        log::info!(
            "Post-processing done: {} coastal clouds removed, {} buffered, {} shadowed",
            summary.coastal_clouds_removed,
            summary.buffered,
            summary.shadowed
        );
        Ok(phase2)
    }
}

fn count_gained(
    before: &Array2<ClassificationFlags>,
    after: &Array2<ClassificationFlags>,
    region: Rect,
    flag: ClassificationFlags,
) -> usize {
    count_changes(before, after, region, |b, a| !b.contains(flag) && a.contains(flag))
}

fn count_lost(
    before: &Array2<ClassificationFlags>,
    after: &Array2<ClassificationFlags>,
    region: Rect,
    flag: ClassificationFlags,
) -> usize {
    count_changes(before, after, region, |b, a| b.contains(flag) && !a.contains(flag))
}

fn count_changes(
    before: &Array2<ClassificationFlags>,
    after: &Array2<ClassificationFlags>,
    region: Rect,
    changed: impl Fn(ClassificationFlags, ClassificationFlags) -> bool,
) -> usize {
    let window = s![region.y..region.y_end(), region.x..region.x_end()];
    before
        .slice(window)
        .iter()
        .zip(after.slice(window).iter())
        .filter(|(b, a)| changed(**b, **a))
        .count()
}
