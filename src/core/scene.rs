//! Scene-level entry point: per-pixel classification of whole scenes or
//! tiles followed by spatial post-processing.

use chrono::NaiveDate;
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::cloud_shadow::{CloudShadowParams, ShadowInputs};
use crate::core::coastline::CoastlineParams;
use crate::core::constants::SensorProfile;
use crate::core::geometry::{self, SunPosition};
use crate::core::lookup::LookupTables;
use crate::core::neural_net::NeuralNet;
use crate::core::pixel_classifier::{
    NnBoundaries, PixelClassifier, PixelClassifierParams, PixelResult,
};
use crate::core::postprocess::{PostProcessContext, PostProcessParams, SpatialPostProcessor};
use crate::core::radiometry;
use crate::io::services::{ElevationService, GeoCoding, SeaIceClimatology, WaterMaskService};
use crate::maybe_rayon::*;
use crate::types::{
    CirrusError, CirrusResult, ClassificationFlags, GeoPos, PixelObservation, Rect, WaterClass,
};

/// Which diagnostic float bands to emit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub nn_output: bool,
    pub reflectances: bool,
    pub brightness_temperatures: bool,
    pub emissivity: bool,
    pub geometry: bool,
}

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Built-in sensor profile id
    pub sensor: String,
    /// Custom profile used instead of the built-in `sensor`
    pub profile: Option<SensorProfile>,
    pub nn_boundaries: NnBoundaries,
    pub cloud_buffer_width: usize,
    pub use_water_fraction: bool,
    pub refine_coastline: bool,
    /// Needs a cloud-top height band
    pub cloud_shadow: bool,
    /// Needs a sea-ice climatology band
    pub sea_ice_check: bool,
    pub sea_ice_min_concentration: f64,
    pub glint_angle_threshold_deg: f64,
    pub diagnostics: DiagnosticsConfig,
    pub shadow: CloudShadowParams,
    pub coastline: CoastlineParams,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sensor: "NOAA18".to_string(),
            profile: None,
            nn_boundaries: NnBoundaries::default(),
            cloud_buffer_width: 2,         // pixels
            use_water_fraction: true,
            refine_coastline: true,
            cloud_shadow: false,
            sea_ice_check: false,
            sea_ice_min_concentration: 0.0, // percent
            glint_angle_threshold_deg: 25.0,
            diagnostics: DiagnosticsConfig::default(),
            shadow: CloudShadowParams::default(),
            coastline: CoastlineParams::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> CirrusResult<()> {
        self.nn_boundaries.validate()?;
        self.coastline.validate()?;
        if self.cloud_shadow {
            self.shadow.validate()?;
        }
        if !(self.glint_angle_threshold_deg >= 0.0 && self.glint_angle_threshold_deg <= 180.0) {
            return Err(CirrusError::Configuration(format!(
                "glint angle threshold {} outside [0, 180]",
                self.glint_angle_threshold_deg
            )));
        }
        if !self.sea_ice_min_concentration.is_finite() {
            return Err(CirrusError::Configuration(
                "sea-ice minimum concentration must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// The custom profile when one is set, otherwise the built-in `sensor`
    pub fn profile(&self) -> CirrusResult<SensorProfile> {
        match &self.profile {
            Some(custom) => {
                custom.validate()?;
                Ok(custom.clone())
            }
            None => SensorProfile::from_id(&self.sensor),
        }
    }

    pub fn pixel_params(&self) -> PixelClassifierParams {
        PixelClassifierParams {
            boundaries: self.nn_boundaries,
            use_water_fraction: self.use_water_fraction,
            sea_ice_check: self.sea_ice_check,
            sea_ice_min_concentration: self.sea_ice_min_concentration,
            glint_angle_threshold_deg: self.glint_angle_threshold_deg,
        }
    }

    pub fn postprocess_params(&self) -> PostProcessParams {
        PostProcessParams {
            cloud_buffer_width: self.cloud_buffer_width,
            refine_coastline: self.refine_coastline,
            cloud_shadow: self.cloud_shadow,
            coastline: self.coastline.clone(),
            shadow: self.shadow.clone(),
        }
    }
}

/// Per-pixel input rasters of one scene, all of the same shape
#[derive(Debug, Clone)]
pub struct SceneInputs {
    pub date: NaiveDate,
    pub sun_zenith: Array2<f32>,
    /// Falls back to the view-zenith table by column
    pub view_zenith: Option<Array2<f32>>,
    /// Falls back to geometry with the scanline centre as satellite nadir
    pub relative_azimuth: Option<Array2<f32>>,
    /// Falls back to the bearing towards the sub-solar point
    pub sun_azimuth: Option<Array2<f32>>,
    pub latitude: Array2<f32>,
    pub longitude: Array2<f32>,
    /// One raster per profile channel, in profile order
    pub channels: Vec<Array2<f32>>,
    pub water_fraction: Option<Array2<u8>>,
    pub water_class: Option<Array2<WaterClass>>,
    pub elevation: Option<Array2<f32>>,
    /// Meters above sea level
    pub cloud_top_height: Option<Array2<f32>>,
    /// Climatological maximum sea-ice concentration, percent
    pub sea_ice_max_concentration: Option<Array2<f32>>,
    /// Scanline position of raster column 0
    pub column_offset: usize,
    /// Samples per full scanline, the raster width when unset
    pub scanline_width: Option<usize>,
}

impl SceneInputs {
    pub fn new(
        date: NaiveDate,
        sun_zenith: Array2<f32>,
        latitude: Array2<f32>,
        longitude: Array2<f32>,
        channels: Vec<Array2<f32>>,
    ) -> CirrusResult<Self> {
        let inputs = Self {
            date,
            sun_zenith,
            view_zenith: None,
            relative_azimuth: None,
            sun_azimuth: None,
            latitude,
            longitude,
            channels,
            water_fraction: None,
            water_class: None,
            elevation: None,
            cloud_top_height: None,
            sea_ice_max_concentration: None,
            column_offset: 0,
            scanline_width: None,
        };
        inputs.check_shapes()?;
        Ok(inputs)
    }

    /// Builds latitude/longitude rasters from a geocoding
    pub fn with_geocoding(
        date: NaiveDate,
        sun_zenith: Array2<f32>,
        channels: Vec<Array2<f32>>,
        geocoding: &dyn GeoCoding,
    ) -> CirrusResult<Self> {
        let dim = sun_zenith.dim();
        let positions = Array2::from_shape_fn(dim, |(y, x)| geocoding.pixel_to_geo(x as f64, y as f64));
        let latitude = positions.mapv(|p| p.lat as f32);
        let longitude = positions.mapv(|p| p.lon as f32);
        Self::new(date, sun_zenith, latitude, longitude, channels)
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.sun_zenith.dim()
    }

    pub fn position(&self, y: usize, x: usize) -> GeoPos {
        GeoPos::new(self.latitude[[y, x]] as f64, self.longitude[[y, x]] as f64)
    }

    fn check_shapes(&self) -> CirrusResult<()> {
        let dim = self.dim();
        let mut shapes: Vec<(String, (usize, usize))> = vec![
            ("latitude".to_string(), self.latitude.dim()),
            ("longitude".to_string(), self.longitude.dim()),
        ];
        let optional = [
            ("view_zenith", &self.view_zenith),
            ("relative_azimuth", &self.relative_azimuth),
            ("sun_azimuth", &self.sun_azimuth),
            ("elevation", &self.elevation),
            ("cloud_top_height", &self.cloud_top_height),
            ("sea_ice_max_concentration", &self.sea_ice_max_concentration),
        ];
        shapes.extend(
            optional
                .iter()
                .filter_map(|(name, band)| band.as_ref().map(|b| (name.to_string(), b.dim()))),
        );
        shapes.extend(
            self.channels
                .iter()
                .enumerate()
                .map(|(i, c)| (format!("channel {}", i), c.dim())),
        );
        if let Some(wf) = &self.water_fraction {
            shapes.push(("water_fraction".to_string(), wf.dim()));
        }
        if let Some(wc) = &self.water_class {
            shapes.push(("water_class".to_string(), wc.dim()));
        }

        match shapes.iter().find(|(_, d)| *d != dim) {
            Some((name, d)) => Err(CirrusError::DimensionMismatch(format!(
                "{} raster is {:?}, sun zenith is {:?}",
                name, d, dim
            ))),
            None => Ok(()),
        }
    }

    /// Samples the collaborator services at every pixel position.
    ///
    /// Elevation lookups that fail leave NaN (sea level) at that pixel.
    pub fn attach_services(
        &mut self,
        water_mask: Option<&dyn WaterMaskService>,
        elevation: Option<&dyn ElevationService>,
        sea_ice: Option<&dyn SeaIceClimatology>,
    ) {
        let dim = self.dim();
        if let Some(mask) = water_mask {
            self.water_fraction = Some(Array2::from_shape_fn(dim, |(y, x)| {
                mask.water_fraction(self.position(y, x))
            }));
            self.water_class = Some(Array2::from_shape_fn(dim, |(y, x)| {
                mask.water_sample(self.position(y, x))
            }));
        }
        if let Some(service) = elevation {
            let mut failures = 0usize;
            let band = Array2::from_shape_fn(dim, |(y, x)| match service.elevation(self.position(y, x)) {
                Ok(h) => h as f32,
                Err(_) => {
                    failures += 1;
                    f32::NAN
                }
            });
            if failures > 0 {
                log::warn!("Elevation unavailable for {} of {} pixels", failures, dim.0 * dim.1);
            }
            self.elevation = Some(band);
        }
        if let Some(climatology) = sea_ice {
            self.sea_ice_max_concentration = Some(Array2::from_shape_fn(dim, |(y, x)| {
                climatology
                    .classification(self.position(y, x))
                    .map_or(f32::NAN, |c| c.max_concentration as f32)
            }));
        }
    }
}

/// Source quantity of a diagnostic band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BandSource {
    NnOutput,
    Albedo(usize),
    BrightnessTemp(usize),
    Emissivity,
    Rho3b,
    Ndvi,
    Ndsi,
    SunZenith,
    ViewZenith,
    RelativeAzimuth,
    GlintAngle,
}

impl BandSource {
    fn value(self, obs: &PixelObservation, r: &PixelResult) -> f64 {
        if r.flags.is_invalid() {
            return f64::NAN;
        }
        match self {
            BandSource::NnOutput => r.nn_output,
            BandSource::Albedo(i) => r.derived.albedo[i],
            BandSource::BrightnessTemp(i) => r.derived.brightness_temp[i],
            BandSource::Emissivity => r.derived.emissivity_3b,
            BandSource::Rho3b => r.derived.rho_3b,
            BandSource::Ndvi => r.derived.ndvi,
            BandSource::Ndsi => r.derived.ndsi,
            BandSource::SunZenith => obs.sun_zenith,
            BandSource::ViewZenith => obs.view_zenith,
            BandSource::RelativeAzimuth => obs.relative_azimuth,
            BandSource::GlintAngle => r.derived.glint_angle,
        }
    }
}

fn diagnostic_bands(config: &DiagnosticsConfig, profile: &SensorProfile) -> Vec<(String, BandSource)> {
    let mut bands = Vec::new();
    if config.nn_output {
        bands.push(("nn_output".to_string(), BandSource::NnOutput));
    }
    for (i, channel) in profile.channels.iter().enumerate() {
        if config.reflectances && channel.is_reflective() {
            bands.push((format!("reflectance_{}", i + 1), BandSource::Albedo(i)));
        }
        if config.brightness_temperatures && !channel.is_reflective() {
            bands.push((format!("bt_{}", i + 1), BandSource::BrightnessTemp(i)));
        }
    }
    if config.emissivity {
        bands.push(("emissivity_3b".to_string(), BandSource::Emissivity));
        bands.push(("rho_3b".to_string(), BandSource::Rho3b));
        bands.push(("ndvi".to_string(), BandSource::Ndvi));
        bands.push(("ndsi".to_string(), BandSource::Ndsi));
    }
    if config.geometry {
        bands.push(("sun_zenith".to_string(), BandSource::SunZenith));
        bands.push(("view_zenith".to_string(), BandSource::ViewZenith));
        bands.push(("relative_azimuth".to_string(), BandSource::RelativeAzimuth));
        bands.push(("glint_angle".to_string(), BandSource::GlintAngle));
    }
    bands
}

/// Float32 diagnostic raster, NaN is no data
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticBand {
    pub name: String,
    pub data: Array2<f32>,
}

/// Classification output of a scene or tile
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationProduct {
    /// Packed flag word per pixel
    pub flags: Array2<u32>,
    pub bands: Vec<DiagnosticBand>,
    /// Position of this product within the input rasters
    pub region: Rect,
}

impl ClassificationProduct {
    pub fn flag(&self, y: usize, x: usize) -> ClassificationFlags {
        ClassificationFlags::from_bits(self.flags[[y, x]])
    }

    pub fn band(&self, name: &str) -> Option<&Array2<f32>> {
        self.bands.iter().find(|b| b.name == name).map(|b| &b.data)
    }

    /// Number of pixels carrying every bit of `flag`
    pub fn count(&self, flag: ClassificationFlags) -> usize {
        self.flags
            .iter()
            .filter(|&&bits| ClassificationFlags::from_bits(bits).contains(flag))
            .count()
    }

    /// Flag names and masks for flag-coding metadata
    pub fn flag_coding() -> Vec<(&'static str, u32)> {
        ClassificationFlags::NAMES
            .iter()
            .map(|(name, flag)| (*name, flag.bits()))
            .collect()
    }
}

/// Whole-scene classifier: validated once, then reusable and shareable across threads
pub struct SceneClassifier {
    config: ClassifierConfig,
    pixel: PixelClassifier,
    post: SpatialPostProcessor,
    bands: Vec<(String, BandSource)>,
}

impl SceneClassifier {
    pub fn new(
        config: ClassifierConfig,
        tables: Arc<LookupTables>,
        net: Option<Arc<NeuralNet>>,
    ) -> CirrusResult<Self> {
        config.validate()?;
        let profile = config.profile()?;
        log::info!("Setting up classifier for sensor {} ({})", profile.id, profile.instrument);
        let bands = diagnostic_bands(&config.diagnostics, &profile);
        let pixel = PixelClassifier::new(profile, tables, net, config.pixel_params())?;
        let post = SpatialPostProcessor::new(config.postprocess_params())?;
        log::debug!(
            "Classifier ready: {} diagnostic bands, halo {} pixels",
            bands.len(),
            post.required_halo()
        );
        Ok(Self { config, pixel, post, bands })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn profile(&self) -> &SensorProfile {
        self.pixel.profile()
    }

    pub fn required_halo(&self) -> usize {
        self.post.required_halo()
    }

    pub fn classify(&self, inputs: &SceneInputs) -> CirrusResult<ClassificationProduct> {
        self.classify_tile(inputs, Rect::from_dim(inputs.dim()))
    }

    /// Classifies `target`, reading up to `required_halo()` pixels of context around it
    pub fn classify_tile(&self, inputs: &SceneInputs, target: Rect) -> CirrusResult<ClassificationProduct> {
        self.check_inputs(inputs)?;
        let bounds = Rect::from_dim(inputs.dim());
        if target.is_empty() || !bounds.encloses(&target) {
            return Err(CirrusError::DimensionMismatch(format!(
                "target {:?} is empty or outside the {:?} scene",
                target,
                inputs.dim()
            )));
        }
        let source = target.expand(self.required_halo(), &bounds);
        log::info!(
            "Classifying {}x{} pixels at ({}, {}) with source {:?}",
            target.height,
            target.width,
            target.y,
            target.x,
            source
        );

        let sun = geometry::sun_position(inputs.date);
        let (flags, diagnostics) = self.classify_pixels(inputs, source, &sun);

        let window = s![source.y..source.y_end(), source.x..source.x_end()];
        let sun_azimuth;
        let shadow = if self.config.cloud_shadow {
            let cloud_top = inputs.cloud_top_height.as_ref().ok_or_else(|| {
                CirrusError::Configuration("cloud shadow enabled but no cloud-top height band".to_string())
            })?;
            sun_azimuth = match &inputs.sun_azimuth {
                Some(band) => band.slice(window).to_owned(),
                None => Array2::from_shape_fn((source.height, source.width), |(i, j)| {
                    geometry::sun_azimuth(inputs.position(source.y + i, source.x + j), sun.subsolar) as f32
                }),
            };
            Some(ShadowInputs {
                latitude: inputs.latitude.slice(window),
                longitude: inputs.longitude.slice(window),
                sun_zenith: inputs.sun_zenith.slice(window),
                sun_azimuth: sun_azimuth.view(),
                cloud_top_height: cloud_top.slice(window),
                elevation: inputs.elevation.as_ref().map(|e| e.slice(window)),
            })
        } else {
            None
        };
        let water_fraction = if self.config.use_water_fraction {
            inputs.water_fraction.as_ref().map(|wf| wf.slice(window))
        } else {
            None
        };
        let ctx = PostProcessContext { water_fraction, shadow };

        let local = Rect::new(target.x - source.x, target.y - source.y, target.width, target.height);
        let processed = self.post.process(flags, &ctx, local)?;

        let crop = s![local.y..local.y_end(), local.x..local.x_end()];
        let product = ClassificationProduct {
            flags: processed.slice(crop).mapv(|f| f.bits()),
            bands: self
                .bands
                .iter()
                .enumerate()
                .map(|(b, (name, _))| DiagnosticBand {
                    name: name.clone(),
                    data: diagnostics.index_axis(Axis(0), b).slice(crop).to_owned(),
                })
                .collect(),
            region: target,
        };

        log::info!(
            "Classification done: {} invalid, {} cloud, {} snow/ice, {} shadow",
            product.count(ClassificationFlags::INVALID),
            product.count(ClassificationFlags::CLOUD),
            product.count(ClassificationFlags::SNOW_ICE),
            product.count(ClassificationFlags::CLOUD_SHADOW)
        );
        Ok(product)
    }

    fn check_inputs(&self, inputs: &SceneInputs) -> CirrusResult<()> {
        inputs.check_shapes()?;
        let expected = self.profile().channels.len();
        if inputs.channels.len() != expected {
            return Err(CirrusError::Configuration(format!(
                "profile {} needs {} channel rasters, got {}",
                self.profile().id,
                expected,
                inputs.channels.len()
            )));
        }
        if self.config.sea_ice_check && inputs.sea_ice_max_concentration.is_none() {
            return Err(CirrusError::Configuration(
                "sea-ice check enabled but no sea-ice climatology band".to_string(),
            ));
        }
        if inputs.relative_azimuth.is_none() {
            log::warn!("No relative azimuth band, deriving it from the scanline geometry");
        }
        Ok(())
    }

    /// Per-pixel pass over `source`; returns flags and the diagnostic cube (band, row, col)
    fn classify_pixels(
        &self,
        inputs: &SceneInputs,
        source: Rect,
        sun: &SunPosition,
    ) -> (Array2<ClassificationFlags>, Array3<f32>) {
        let mut flags = Array2::from_elem((source.height, source.width), ClassificationFlags::NONE);
        let mut diagnostics = Array3::from_elem((self.bands.len(), source.height, source.width), f32::NAN);
        let distance_correction = radiometry::distance_correction_for_date(inputs.date);
        let cols = inputs.dim().1;
        let scanline_width = inputs.scanline_width.unwrap_or(cols + inputs.column_offset);
        let nadir_column = (scanline_width / 2).saturating_sub(inputs.column_offset).min(cols - 1);

        flags
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(diagnostics.axis_iter_mut(Axis(1)).into_par_iter())
            .enumerate()
            .for_each(|(i, (mut flag_row, mut band_row))| {
                let y = source.y + i;
                let mut scratch = self.pixel.scratch();
                let satellite = inputs.position(y, nadir_column);
                for j in 0..source.width {
                    let x = source.x + j;
                    let obs = self.observation(inputs, y, x, satellite, sun, scanline_width, distance_correction);
                    let result = self.pixel.classify(&obs, &mut scratch);
                    flag_row[j] = result.flags;
                    for (b, (_, band)) in self.bands.iter().enumerate() {
                        band_row[[b, j]] = band.value(&obs, &result) as f32;
                    }
                }
            });

        (flags, diagnostics)
    }

    #[allow(clippy::too_many_arguments)]
    fn observation(
        &self,
        inputs: &SceneInputs,
        y: usize,
        x: usize,
        satellite: GeoPos,
        sun: &SunPosition,
        scanline_width: usize,
        distance_correction: f64,
    ) -> PixelObservation {
        let sample = |band: &Option<Array2<f32>>| band.as_ref().map(|b| b[[y, x]] as f64);
        let position = inputs.position(y, x);
        let sun_zenith = inputs.sun_zenith[[y, x]] as f64;

        let mut obs = PixelObservation {
            sun_zenith,
            view_zenith: sample(&inputs.view_zenith).unwrap_or_else(|| {
                self.pixel
                    .tables()
                    .view_zenith(x + inputs.column_offset, scanline_width)
            }),
            relative_azimuth: sample(&inputs.relative_azimuth).unwrap_or_else(|| {
                geometry::relative_azimuth(sun_zenith, satellite, position, sun.subsolar)
            }),
            water_fraction: inputs.water_fraction.as_ref().map_or(u8::MAX, |wf| wf[[y, x]]),
            water_class: inputs
                .water_class
                .as_ref()
                .map_or(WaterClass::Invalid, |wc| wc[[y, x]]),
            latitude: position.lat,
            longitude: position.lon,
            elevation: sample(&inputs.elevation).filter(|h| h.is_finite()),
            distance_correction,
            sea_ice_max_concentration: sample(&inputs.sea_ice_max_concentration).filter(|c| c.is_finite()),
            ..Default::default()
        };
        for (i, band) in inputs.channels.iter().enumerate() {
            obs.channels[i] = band[[y, x]] as f64;
        }
        obs
    }
}
