//! Radiometric conversions between albedo, radiance and brightness temperature.
//!
//! Conversions return `None` for physically impossible inputs (sun below the
//! horizon, non-positive radiance, a channel without the needed calibration);
//! the per-pixel path maps `None` to the INVALID flag.

use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

use crate::core::constants::{
    ChannelCalibration, ChannelRole, SensorProfile, PLANCK_C1, PLANCK_C2,
};
use crate::core::geometry;
use crate::types::{DerivedQuantities, PixelObservation};

/// Earth-sun distance correction for a day of year
pub fn distance_correction(day_of_year: u32) -> f64 {
    1.0 + 0.033 * (2.0 * PI * day_of_year as f64 / 365.0).cos()
}

pub fn distance_correction_for_date(date: NaiveDate) -> f64 {
    distance_correction(date.ordinal())
}

/// Factor turning albedo (%) into radiance for a reflective channel
fn reflective_factor(
    profile: &SensorProfile,
    channel: usize,
    sun_zenith: f64,
    distance_correction: f64,
) -> Option<f64> {
    let spec = profile.channels.get(channel)?;
    let (f, w) = match spec.calibration {
        ChannelCalibration::Reflective { solar_irradiance, response_width } => {
            (solar_irradiance, response_width)
        }
        ChannelCalibration::Emissive { .. } => return None,
    };

    // cos(90 deg) is not exactly zero in floating point
    if !(sun_zenith < 90.0) || distance_correction <= 0.0 {
        return None;
    }
    let cos_sza = sun_zenith.to_radians().cos();
    if !cos_sza.is_finite() || cos_sza <= 0.0 {
        return None;
    }

    Some(f / (100.0 * PI * w * cos_sza * distance_correction * distance_correction))
}

pub fn albedo_to_radiance(
    albedo: f64,
    sun_zenith: f64,
    distance_correction: f64,
    profile: &SensorProfile,
    channel: usize,
) -> Option<f64> {
    reflective_factor(profile, channel, sun_zenith, distance_correction).map(|k| albedo * k)
}

pub fn radiance_to_albedo(
    radiance: f64,
    sun_zenith: f64,
    distance_correction: f64,
    profile: &SensorProfile,
    channel: usize,
) -> Option<f64> {
    reflective_factor(profile, channel, sun_zenith, distance_correction).map(|k| radiance / k)
}

/// Planck radiance (mW m-2 sr-1 cm) at a wavenumber (cm-1) and temperature (K)
pub fn planck_radiance(wavenumber: f64, temperature: f64) -> f64 {
    let nu3 = wavenumber * wavenumber * wavenumber;
    PLANCK_C1 * nu3 / ((PLANCK_C2 * wavenumber / temperature).exp() - 1.0)
}

/// Inverse Planck: brightness temperature (K) of a radiance
pub fn planck_temperature(wavenumber: f64, radiance: f64) -> Option<f64> {
    if !(radiance > 0.0) || !(wavenumber > 0.0) {
        return None;
    }
    let nu3 = wavenumber * wavenumber * wavenumber;
    let bt = PLANCK_C2 * wavenumber / (1.0 + PLANCK_C1 * nu3 / radiance).ln();
    bt.is_finite().then_some(bt)
}

pub fn radiance_to_bt(radiance: f64, profile: &SensorProfile, channel: usize) -> Option<f64> {
    let nu = profile.channels.get(channel)?.wavenumber()?;
    planck_temperature(nu, radiance)
}

pub fn bt_to_radiance(bt: f64, profile: &SensorProfile, channel: usize) -> Option<f64> {
    let nu = profile.channels.get(channel)?.wavenumber()?;
    if !(bt > 0.0) {
        return None;
    }
    Some(planck_radiance(nu, bt))
}

fn normalized_difference(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum == 0.0 {
        f64::NAN
    } else {
        (a - b) / sum
    }
}

/// Derives every physical quantity the classifiers need from one observation.
///
/// Returns `None` when any channel value is impossible or the sun is at or
/// below the horizon.
pub fn derive_quantities(
    profile: &SensorProfile,
    obs: &PixelObservation,
) -> Option<DerivedQuantities> {
    if !(obs.sun_zenith.is_finite() && obs.sun_zenith < 90.0) {
        return None;
    }
    let d = obs.distance_correction;
    let mut q = DerivedQuantities::default();

    for (i, spec) in profile.channels.iter().enumerate() {
        let value = obs.channels[i];
        if spec.is_reflective() {
            if !(value.is_finite() && value >= 0.0) {
                return None;
            }
            q.albedo[i] = value;
            q.radiance[i] = albedo_to_radiance(value, obs.sun_zenith, d, profile, i)?;
        } else {
            if !(value.is_finite() && value > 0.0) {
                return None;
            }
            q.radiance[i] = value;
            q.brightness_temp[i] = radiance_to_bt(value, profile, i)?;
        }
    }

    let visible = profile.channel(ChannelRole::Visible).map(|(i, _)| q.albedo[i]);
    let nir = profile.channel(ChannelRole::NearInfrared).map(|(i, _)| q.albedo[i]);
    if let (Some(a1), Some(a2)) = (visible, nir) {
        q.ndvi = normalized_difference(a2, a1);
    }

    if let (Some((i3, mid)), Some((i4, _))) = (
        profile.channel(ChannelRole::MidInfrared),
        profile.channel(ChannelRole::Thermal11),
    ) {
        if let ChannelCalibration::Emissive { wavenumber, solar_irradiance } = mid.calibration {
            let l3 = q.radiance[i3];
            let b3 = planck_radiance(wavenumber, q.brightness_temp[i4]);
            q.emissivity_3b = l3 / b3;

            if let Some(f3) = solar_irradiance {
                let incoming = f3 * obs.sun_zenith.to_radians().cos() * d / PI - b3;
                if incoming > 0.0 {
                    q.rho_3b = (l3 - b3) / incoming;
                }
            }
        }
    }

    if let Some(a1) = visible {
        q.ndsi = normalized_difference(a1, q.rho_3b * 100.0);
    }

    q.glint_angle = geometry::glint_angle(obs.sun_zenith, obs.view_zenith, obs.relative_azimuth);
    Some(q)
}
