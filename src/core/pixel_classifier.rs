//! Per-pixel composition of the network and decision-tree results.
//!
//! Priority is strict: snow/ice pre-empts sure cloud, which pre-empts
//! ambiguous cloud. Cloud buffer and cloud shadow are never set here.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::constants::{SensorProfile, NN_OUTPUT_MAX};
use crate::core::decision_tree::{DecisionTreeClassifier, DecisionTreeResult};
use crate::core::lookup::LookupTables;
use crate::core::neural_net::{self, NetScratch, NeuralNet};
use crate::core::radiometry;
use crate::types::{
    CirrusError, CirrusResult, ClassificationFlags, DerivedQuantities, GeoPos,
    PixelObservation, WaterClass, WATER_FRACTION_MAX,
};

/// Class boundaries partitioning the single network output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NnBoundaries {
    pub ambiguous_lower: f64,
    pub ambiguous_sure: f64,
    pub sure_snow: f64,
}

impl Default for NnBoundaries {
    fn default() -> Self {
        Self {
            ambiguous_lower: 2.0,
            ambiguous_sure: 3.2,
            sure_snow: 3.8,
        }
    }
}

/// Class band of a network output value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NnBand {
    Clear,
    Ambiguous,
    Sure,
    SnowIce,
}

impl NnBoundaries {
    pub fn validate(&self) -> CirrusResult<()> {
        let ordered = 0.0 < self.ambiguous_lower
            && self.ambiguous_lower < self.ambiguous_sure
            && self.ambiguous_sure < self.sure_snow
            && self.sure_snow <= NN_OUTPUT_MAX;
        if !ordered {
            return Err(CirrusError::Configuration(format!(
                "NN boundaries must satisfy 0 < {} < {} < {} <= {}",
                self.ambiguous_lower, self.ambiguous_sure, self.sure_snow, NN_OUTPUT_MAX
            )));
        }
        Ok(())
    }

    /// Bands: ambiguous `[lower, ambiguous_sure)`, sure `[ambiguous_sure, sure_snow]`,
    /// snow/ice `(sure_snow, 5]`; everything else (including NaN) is clear.
    ///
    /// Both ends of the sure band are closed. An output exactly equal to
    /// `ambiguous_sure` or `sure_snow` is sure cloud, not clear, so the three
    /// cloud bands cover `[lower, 5]` without gaps.
    pub fn band(&self, value: f64) -> NnBand {
        if value > self.sure_snow && value <= NN_OUTPUT_MAX {
            NnBand::SnowIce
        } else if value >= self.ambiguous_sure && value <= self.sure_snow {
            NnBand::Sure
        } else if value >= self.ambiguous_lower && value < self.ambiguous_sure {
            NnBand::Ambiguous
        } else {
            NnBand::Clear
        }
    }
}

/// Parameters of the per-pixel decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelClassifierParams {
    pub boundaries: NnBoundaries,
    pub use_water_fraction: bool,
    pub sea_ice_check: bool,
    pub sea_ice_min_concentration: f64,
    pub glint_angle_threshold_deg: f64,
}

impl Default for PixelClassifierParams {
    fn default() -> Self {
        Self {
            boundaries: NnBoundaries::default(),
            use_water_fraction: true,
            sea_ice_check: false,
            sea_ice_min_concentration: 0.0,
            glint_angle_threshold_deg: 25.0,
        }
    }
}

/// Land/water status of one pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Surface {
    pub land: bool,
    pub water: bool,
    pub coastline: bool,
}

impl Surface {
    /// From the water fraction, or from the water-mask sample when fractions
    /// are disabled or the fraction is the no-data sentinel
    pub fn of(obs: &PixelObservation, use_water_fraction: bool) -> Self {
        if use_water_fraction && obs.water_fraction <= WATER_FRACTION_MAX {
            let wf = obs.water_fraction;
            Self {
                land: wf == 0,
                water: wf == WATER_FRACTION_MAX,
                coastline: wf > 0 && wf < WATER_FRACTION_MAX,
            }
        } else {
            Self {
                land: obs.water_class == WaterClass::Land,
                water: obs.water_class == WaterClass::Water,
                coastline: false,
            }
        }
    }
}

/// Everything the classifier produced for one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelResult {
    pub flags: ClassificationFlags,
    pub nn_output: f64,
    pub derived: DerivedQuantities,
    pub tree: DecisionTreeResult,
}

impl PixelResult {
    fn invalid() -> Self {
        Self {
            flags: ClassificationFlags::INVALID,
            nn_output: f64::NAN,
            derived: DerivedQuantities::default(),
            tree: DecisionTreeResult::default(),
        }
    }
}

/// Per-worker scratch buffers
#[derive(Debug, Clone, Default)]
pub struct PixelScratch {
    input: Vec<f64>,
    net: NetScratch,
}

/// Composition root of the per-pixel decision
#[derive(Debug, Clone)]
pub struct PixelClassifier {
    profile: SensorProfile,
    tables: Arc<LookupTables>,
    net: Option<Arc<NeuralNet>>,
    tree: DecisionTreeClassifier,
    params: PixelClassifierParams,
}

impl PixelClassifier {
    pub fn new(
        profile: SensorProfile,
        tables: Arc<LookupTables>,
        net: Option<Arc<NeuralNet>>,
        params: PixelClassifierParams,
    ) -> CirrusResult<Self> {
        profile.validate()?;
        params.boundaries.validate()?;

        if let Some(net) = &net {
            if net.input_count() != profile.nn_input_count() {
                return Err(CirrusError::Configuration(format!(
                    "network takes {} inputs but profile {} provides {}",
                    net.input_count(),
                    profile.id,
                    profile.nn_input_count()
                )));
            }
            if net.output_count() == 0 {
                return Err(CirrusError::Configuration("network has no outputs".to_string()));
            }
        } else {
            log::warn!("No neural net attached, classification uses the decision tree only");
        }

        let tree = DecisionTreeClassifier::new(&profile);
        log::debug!("Pixel classifier for {} with {:?}", profile.id, params);

        Ok(Self { profile, tables, net, tree, params })
    }

    pub fn profile(&self) -> &SensorProfile {
        &self.profile
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    pub fn params(&self) -> &PixelClassifierParams {
        &self.params
    }

    pub fn scratch(&self) -> PixelScratch {
        PixelScratch {
            input: Vec::with_capacity(self.profile.nn_input_count()),
            net: self.net.as_ref().map(|n| n.scratch()).unwrap_or_default(),
        }
    }

    pub fn classify(&self, obs: &PixelObservation, scratch: &mut PixelScratch) -> PixelResult {
        let position = GeoPos::new(obs.latitude, obs.longitude);
        if !(obs.view_zenith.is_finite() && obs.relative_azimuth.is_finite() && position.is_valid()) {
            return PixelResult::invalid();
        }
        let Some(derived) = radiometry::derive_quantities(&self.profile, obs) else {
            return PixelResult::invalid();
        };

        let surface = Surface::of(obs, self.params.use_water_fraction);
        let tree = self
            .tree
            .evaluate(&self.tables, &derived, position, obs.sun_zenith, surface.land);

        let nn_output = match &self.net {
            Some(net) => {
                neural_net::build_input(&self.profile, obs, &derived, &mut scratch.input);
                net.infer_with(&scratch.input, &mut scratch.net)[0]
            }
            None => f64::NAN,
        };
        let band = self.params.boundaries.band(nn_output);

        let mut snow_ice = tree.snow || band == NnBand::SnowIce;
        if snow_ice && surface.water && self.params.sea_ice_check {
            snow_ice = obs
                .sea_ice_max_concentration
                .map_or(false, |c| c > self.params.sea_ice_min_concentration);
        }

        // decision-tree cloud short-circuits the network sub-test
        let cloud_sure = !snow_ice && (tree.cloud || band == NnBand::Sure);
        let cloud_ambiguous = !snow_ice && !cloud_sure && band == NnBand::Ambiguous;
        let cloud = cloud_sure || cloud_ambiguous;

        let glint = surface.water
            && !cloud
            && !snow_ice
            && derived.glint_angle < self.params.glint_angle_threshold_deg;

        let mut flags = tree.diagnostic_flags();
        flags.set(ClassificationFlags::CLOUD, cloud);
        flags.set(ClassificationFlags::CLOUD_SURE, cloud_sure);
        flags.set(ClassificationFlags::CLOUD_AMBIGUOUS, cloud_ambiguous);
        flags.set(ClassificationFlags::SNOW_ICE, snow_ice);
        flags.set(ClassificationFlags::GLINT_RISK, glint);
        flags.set(ClassificationFlags::COASTLINE, surface.coastline);
        flags.set(ClassificationFlags::LAND, surface.land);

        PixelResult { flags, nn_output, derived, tree }
    }
}
