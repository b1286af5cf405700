//! Physical constants and per-sensor calibration profiles.
//!
//! A [`SensorProfile`] is resolved once at pipeline setup and then passed by
//! reference into every classification routine; nothing here is looked up
//! per pixel by sensor name.

use serde::{Deserialize, Serialize};

use crate::types::{CirrusError, CirrusResult, MAX_CHANNELS};

/// First radiation constant, mW m-2 sr-1 cm4
pub const PLANCK_C1: f64 = 1.191_042e-5;
/// Second radiation constant, cm K
pub const PLANCK_C2: f64 = 1.438_775_2;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Upper end of the single-output cloud network's value range
pub const NN_OUTPUT_MAX: f64 = 5.0;

/// Number of geometry inputs (sza, vza, relative azimuth) preceding channel inputs
pub const NN_ANGLE_INPUTS: usize = 3;

/// Spectral role of a channel within the decision tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelRole {
    /// 0.63 um
    Visible,
    /// 0.86 um
    NearInfrared,
    /// 3.7 um, mixed reflected/emitted
    MidInfrared,
    /// 11 um
    Thermal11,
    /// 12 um
    Thermal12,
    /// Channel without a decision-tree role (NN input only)
    Other,
}

/// Calibration constants of one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChannelCalibration {
    /// Solar-reflective channel delivered as albedo (%)
    Reflective {
        /// Integrated solar spectral irradiance, W m-2
        solar_irradiance: f64,
        /// Equivalent spectral response width, um
        response_width: f64,
    },
    /// Emissive channel delivered as radiance (mW m-2 sr-1 cm)
    Emissive {
        /// Central wavenumber, cm-1
        wavenumber: f64,
        /// In-band solar irradiance (mW m-2 cm) for the reflected part of a 3.7 um channel
        solar_irradiance: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub role: ChannelRole,
    pub calibration: ChannelCalibration,
}

impl ChannelSpec {
    pub fn is_reflective(&self) -> bool {
        matches!(self.calibration, ChannelCalibration::Reflective { .. })
    }

    pub fn wavenumber(&self) -> Option<f64> {
        match self.calibration {
            ChannelCalibration::Emissive { wavenumber, .. } => Some(wavenumber),
            ChannelCalibration::Reflective { .. } => None,
        }
    }
}

/// Threshold values of the physical decision tree.
///
/// Temperatures are Kelvin throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// TGCT: gross cloud test on the 11 um brightness temperature
    pub tgct_bt4: f64,
    /// RRCT: upper bound of the NIR/VIS albedo ratio for cloud
    pub rrct_ratio: f64,
    /// C3AT: lower bound of the 3.7 um reflective part for cloud
    pub c3at_rho3b: f64,
    /// Emissivity at 3.7 um separating water cloud (above) from snow/ice (below)
    pub emissivity: f64,
    /// Latitude band inside which desert pixels use the relaxed branch
    pub desert_abs_latitude: f64,
    /// Sun zenith below which the TMFT day envelope applies
    pub tmft_day_sza: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            tgct_bt4: 244.0,
            rrct_ratio: 1.1,
            c3at_rho3b: 0.06,
            emissivity: 2.2,
            desert_abs_latitude: 60.0,
            tmft_day_sza: 80.0,
        }
    }
}

/// How acquisition dates are encoded in product names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatestringConvention {
    /// NOAA CLASS level-1b names: `NSS.GHRR.NJ.D95056.S1116...`
    Nss,
    /// First `YYYYMMDD` run in the name
    Compact,
}

/// Cross-track scan geometry used to tabulate view zenith by column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanGeometry {
    /// Nominal orbit altitude, km
    pub altitude_km: f64,
    /// Full-resolution samples per scanline
    pub lac_samples: usize,
    /// Reduced-resolution samples per scanline
    pub gac_samples: usize,
    /// Scan angle of the outermost sample, degrees
    pub max_scan_angle: f64,
}

impl Default for ScanGeometry {
    fn default() -> Self {
        Self {
            altitude_km: 833.0,
            lac_samples: 2048,
            gac_samples: 409,
            max_scan_angle: 55.37,
        }
    }
}

impl ScanGeometry {
    pub fn validate(&self) -> CirrusResult<()> {
        if self.lac_samples == 0 || self.gac_samples == 0 {
            return Err(CirrusError::Configuration(format!(
                "Scan geometry needs at least one sample per scanline, got {} LAC and {} GAC",
                self.lac_samples, self.gac_samples
            )));
        }
        if !(self.altitude_km.is_finite() && self.altitude_km > 0.0) {
            return Err(CirrusError::Configuration(format!(
                "Scan altitude must be a positive number of km, got {}",
                self.altitude_km
            )));
        }
        if !(self.max_scan_angle.is_finite() && self.max_scan_angle > 0.0 && self.max_scan_angle < 90.0) {
            return Err(CirrusError::Configuration(format!(
                "Maximum scan angle must lie in (0, 90) degrees, got {}",
                self.max_scan_angle
            )));
        }
        Ok(())
    }
}

/// Strategy object describing one sensor/platform combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub id: String,
    pub platform: String,
    pub instrument: String,
    pub channels: Vec<ChannelSpec>,
    /// Channel indices fed (square-rooted) to the network after the angles
    pub nn_input_channels: Vec<usize>,
    pub thresholds: DecisionThresholds,
    pub datestring: DatestringConvention,
    pub scan: ScanGeometry,
}

/// (solar irradiance W m-2, equivalent width um) for channels 1 and 2,
/// central wavenumbers for channels 3b, 4 and 5, orbit altitude
struct AvhrrConstants {
    id: &'static str,
    platform: &'static str,
    reflective: [(f64, f64); 2],
    wavenumbers: [f64; 3],
    altitude_km: f64,
    datestring: DatestringConvention,
}

const AVHRR_PLATFORMS: [AvhrrConstants; 11] = [
    AvhrrConstants { id: "NOAA7", platform: "NOAA-7", reflective: [(177.5, 0.108), (261.9, 0.249)], wavenumbers: [2671.40, 926.80, 840.50], altitude_km: 847.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA9", platform: "NOAA-9", reflective: [(191.3, 0.117), (251.8, 0.239)], wavenumbers: [2678.11, 929.46, 845.19], altitude_km: 849.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA11", platform: "NOAA-11", reflective: [(184.1, 0.113), (241.1, 0.229)], wavenumbers: [2671.40, 926.81, 841.40], altitude_km: 841.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA14", platform: "NOAA-14", reflective: [(221.42, 0.136), (252.29, 0.245)], wavenumbers: [2645.90, 929.33, 835.16], altitude_km: 845.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA15", platform: "NOAA-15", reflective: [(139.0, 0.1132), (232.5, 0.2291)], wavenumbers: [2695.97, 925.41, 839.90], altitude_km: 807.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA16", platform: "NOAA-16", reflective: [(133.3, 0.1144), (242.8, 0.2391)], wavenumbers: [2700.11, 917.23, 838.13], altitude_km: 849.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA17", platform: "NOAA-17", reflective: [(137.4, 0.1175), (219.9, 0.2237)], wavenumbers: [2669.36, 926.29, 839.82], altitude_km: 810.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA18", platform: "NOAA-18", reflective: [(130.1, 0.1183), (233.5, 0.2362)], wavenumbers: [2659.80, 928.15, 833.25], altitude_km: 854.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "NOAA19", platform: "NOAA-19", reflective: [(135.3, 0.1180), (220.3, 0.2210)], wavenumbers: [2670.00, 928.90, 831.90], altitude_km: 870.0, datestring: DatestringConvention::Nss },
    AvhrrConstants { id: "METOPA", platform: "MetOp-A", reflective: [(138.7, 0.1150), (235.8, 0.2390)], wavenumbers: [2687.00, 927.20, 837.70], altitude_km: 817.0, datestring: DatestringConvention::Compact },
    AvhrrConstants { id: "METOPB", platform: "MetOp-B", reflective: [(137.2, 0.1160), (233.9, 0.2380)], wavenumbers: [2687.00, 928.20, 836.60], altitude_km: 817.0, datestring: DatestringConvention::Compact },
];

/// In-band solar irradiance of the AVHRR 3.7 um channel, mW m-2 cm
const AVHRR_CH3B_SOLAR_IRRADIANCE: f64 = 4.98;

/// NOAA NSS platform codes mapped to profile ids
const NSS_PLATFORM_CODES: [(&str, &str); 11] = [
    ("NC", "NOAA7"),
    ("NF", "NOAA9"),
    ("NH", "NOAA11"),
    ("NJ", "NOAA14"),
    ("NK", "NOAA15"),
    ("NL", "NOAA16"),
    ("NM", "NOAA17"),
    ("NN", "NOAA18"),
    ("NP", "NOAA19"),
    ("M2", "METOPA"),
    ("M1", "METOPB"),
];

impl SensorProfile {
    /// Resolve a built-in profile by id (case and separator insensitive)
    pub fn from_id(id: &str) -> CirrusResult<Self> {
        let key: String = id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();

        let constants = AVHRR_PLATFORMS
            .iter()
            .find(|p| p.id == key)
            .ok_or_else(|| {
                CirrusError::Configuration(format!(
                    "Unknown sensor id '{}', expected one of {:?}",
                    id,
                    Self::builtin_ids()
                ))
            })?;

        let profile = Self::avhrr(constants);
        log::debug!("Resolved sensor profile {} ({})", profile.id, profile.platform);
        Ok(profile)
    }

    /// Resolve a built-in profile from a two-letter NOAA NSS platform code
    pub fn from_nss_code(code: &str) -> CirrusResult<Self> {
        let upper = code.to_ascii_uppercase();
        let id = NSS_PLATFORM_CODES
            .iter()
            .find(|(c, _)| *c == upper)
            .map(|(_, id)| *id)
            .ok_or_else(|| {
                CirrusError::Configuration(format!("Unknown NSS platform code '{}'", code))
            })?;
        Self::from_id(id)
    }

    pub fn builtin_ids() -> Vec<&'static str> {
        AVHRR_PLATFORMS.iter().map(|p| p.id).collect()
    }

    pub fn nss_profile_id(code: &str) -> Option<&'static str> {
        NSS_PLATFORM_CODES
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code))
            .map(|(_, id)| *id)
    }

    fn avhrr(c: &AvhrrConstants) -> Self {
        let reflective = |name: &str, role, (f, w): (f64, f64)| ChannelSpec {
            name: name.to_string(),
            role,
            calibration: ChannelCalibration::Reflective {
                solar_irradiance: f,
                response_width: w,
            },
        };
        let emissive = |name: &str, role, nu: f64, solar: Option<f64>| ChannelSpec {
            name: name.to_string(),
            role,
            calibration: ChannelCalibration::Emissive {
                wavenumber: nu,
                solar_irradiance: solar,
            },
        };

        Self {
            id: c.id.to_string(),
            platform: c.platform.to_string(),
            instrument: "AVHRR".to_string(),
            channels: vec![
                reflective("albedo_1", ChannelRole::Visible, c.reflective[0]),
                reflective("albedo_2", ChannelRole::NearInfrared, c.reflective[1]),
                emissive("radiance_3", ChannelRole::MidInfrared, c.wavenumbers[0], Some(AVHRR_CH3B_SOLAR_IRRADIANCE)),
                emissive("radiance_4", ChannelRole::Thermal11, c.wavenumbers[1], None),
                emissive("radiance_5", ChannelRole::Thermal12, c.wavenumbers[2], None),
            ],
            nn_input_channels: vec![0, 1, 3, 4],
            thresholds: DecisionThresholds::default(),
            datestring: c.datestring,
            scan: ScanGeometry {
                altitude_km: c.altitude_km,
                ..ScanGeometry::default()
            },
        }
    }

    /// Index and spec of the channel playing `role`, if any
    pub fn channel(&self, role: ChannelRole) -> Option<(usize, &ChannelSpec)> {
        self.channels.iter().enumerate().find(|(_, c)| c.role == role)
    }

    /// Whether every channel role required by the decision tree is present
    pub fn supports_decision_tree(&self) -> bool {
        [
            ChannelRole::Visible,
            ChannelRole::NearInfrared,
            ChannelRole::MidInfrared,
            ChannelRole::Thermal11,
            ChannelRole::Thermal12,
        ]
        .iter()
        .all(|&role| self.channel(role).is_some())
    }

    /// Number of inputs a network must accept for this profile
    pub fn nn_input_count(&self) -> usize {
        NN_ANGLE_INPUTS + self.nn_input_channels.len()
    }

    /// Setup-time consistency check of a (possibly deserialized) profile
    pub fn validate(&self) -> CirrusResult<()> {
        if self.channels.is_empty() || self.channels.len() > MAX_CHANNELS {
            return Err(CirrusError::Configuration(format!(
                "Profile {} has {} channels, expected 1..={}",
                self.id,
                self.channels.len(),
                MAX_CHANNELS
            )));
        }

        for channel in &self.channels {
            let ok = match channel.calibration {
                ChannelCalibration::Reflective { solar_irradiance, response_width } => {
                    solar_irradiance > 0.0 && response_width > 0.0
                }
                ChannelCalibration::Emissive { wavenumber, solar_irradiance } => {
                    wavenumber > 0.0 && solar_irradiance.map_or(true, |f| f > 0.0)
                }
            };
            if !ok {
                return Err(CirrusError::Configuration(format!(
                    "Channel {} of profile {} has non-positive calibration constants",
                    channel.name, self.id
                )));
            }
        }

        if let Some(&bad) = self.nn_input_channels.iter().find(|&&i| i >= self.channels.len()) {
            return Err(CirrusError::Configuration(format!(
                "NN input channel index {} out of range for profile {}",
                bad, self.id
            )));
        }

        if self.channel(ChannelRole::Visible).map_or(false, |(_, c)| !c.is_reflective())
            || self.channel(ChannelRole::NearInfrared).map_or(false, |(_, c)| !c.is_reflective())
        {
            return Err(CirrusError::Configuration(format!(
                "Profile {}: visible/NIR roles must be reflective channels",
                self.id
            )));
        }

        self.scan.validate()
    }
}
