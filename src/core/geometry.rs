//! Sun and satellite geometry on a spherical Earth.
//!
//! Every `acos`/`asin` argument is clamped to [-1, 1] before evaluation, so
//! none of these functions returns NaN for finite inputs.

use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;

use crate::core::constants::EARTH_RADIUS_M;
use crate::types::GeoPos;

/// Solar ephemeris for one date
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    /// Sub-solar point
    pub subsolar: GeoPos,
    /// Solar declination, degrees
    pub declination: f64,
    /// Equation of time, minutes
    pub equation_of_time: f64,
}

/// Sub-solar point for a date.
///
/// Product dates carry no time of day, so the sub-solar longitude is the
/// one at 12:00 UTC; only the latitude (declination) is date-accurate.
pub fn sun_position(date: NaiveDate) -> SunPosition {
    // Spencer (1971) Fourier series
    let gamma = 2.0 * PI * (date.ordinal() as f64 - 1.0) / 365.0;
    let declination = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();
    let equation_of_time = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    SunPosition {
        subsolar: GeoPos::new(declination.to_degrees(), -equation_of_time / 4.0),
        declination: declination.to_degrees(),
        equation_of_time,
    }
}

/// Wraps an angle into (-180, 180]
pub fn wrap_degrees(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

/// Central angle between two positions, radians
pub fn central_angle(a: GeoPos, b: GeoPos) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();
    let cos_c = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * dlon.cos();
    cos_c.clamp(-1.0, 1.0).acos()
}

/// Great-circle distance in meters
pub fn great_circle_distance(a: GeoPos, b: GeoPos) -> f64 {
    EARTH_RADIUS_M * central_angle(a, b)
}

/// Initial great-circle bearing from `from` to `to`, degrees clockwise from north in [0, 360).
///
/// Coincident points give 0; from a pole every direction points along a
/// meridian and the bearing follows the target longitude.
pub fn bearing(from: GeoPos, to: GeoPos) -> f64 {
    let c = central_angle(from, to);
    if c < 1e-12 {
        return 0.0;
    }

    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = wrap_degrees(to.lon - from.lon).to_radians();

    let cos_lat1 = lat1.cos();
    if cos_lat1.abs() < 1e-12 {
        return if lat1 > 0.0 { 180.0 } else { 0.0 };
    }
    if (PI - c) < 1e-12 {
        // antipode: every bearing reaches it, pick due north
        return 0.0;
    }

    let cos_b = (lat2.sin() - lat1.sin() * c.cos()) / (cos_lat1 * c.sin());
    let b = cos_b.clamp(-1.0, 1.0).acos().to_degrees();
    if dlon < 0.0 {
        360.0 - b
    } else {
        b
    }
}

/// Position reached travelling `distance_m` along `bearing_deg` from `start`
pub fn destination_point(start: GeoPos, bearing_deg: f64, distance_m: f64) -> GeoPos {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = start.lat.to_radians();
    let lon1 = start.lon.to_radians();

    let sin_lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0);
    let lat2 = sin_lat2.asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * sin_lat2);

    GeoPos::new(lat2.to_degrees(), wrap_degrees(lon2.to_degrees()))
}

/// Azimuth of the sun as seen from `point`
pub fn sun_azimuth(point: GeoPos, sun: GeoPos) -> f64 {
    bearing(point, sun)
}

/// Signed sun-minus-satellite azimuth at `point`, wrapped into (-180, 180].
///
/// With the sun in the zenith the azimuth is undefined and 0 is returned.
pub fn relative_azimuth(sun_zenith: f64, satellite: GeoPos, point: GeoPos, sun: GeoPos) -> f64 {
    if sun_zenith.abs() < 1e-6 {
        return 0.0;
    }
    let satellite_azimuth = bearing(point, satellite);
    let sun_az = bearing(point, sun);
    wrap_degrees(sun_az - satellite_azimuth)
}

/// Angle (degrees) between the view direction and the specular reflection
/// direction; `relative_azimuth` of 180 is the specular configuration.
pub fn glint_angle(sun_zenith: f64, view_zenith: f64, relative_azimuth: f64) -> f64 {
    let (ts, tv) = (sun_zenith.to_radians(), view_zenith.to_radians());
    let phi = relative_azimuth.to_radians();
    let cos_w = ts.cos() * tv.cos() - ts.sin() * tv.sin() * phi.cos();
    cos_w.clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_declination_at_solstices() {
        let june = sun_position(NaiveDate::from_ymd_opt(2020, 6, 21).unwrap());
        assert!((june.declination - 23.44).abs() < 0.5, "{}", june.declination);
        let december = sun_position(NaiveDate::from_ymd_opt(2020, 12, 21).unwrap());
        assert!((december.declination + 23.44).abs() < 0.5);
        let equinox = sun_position(NaiveDate::from_ymd_opt(2021, 3, 20).unwrap());
        assert!(equinox.declination.abs() < 1.0);
        assert!(june.subsolar.lon.abs() < 5.0);
    }

    #[test]
    fn test_wrap() {
        assert_relative_eq!(wrap_degrees(190.0), -170.0);
        assert_relative_eq!(wrap_degrees(-180.0), 180.0);
        assert_relative_eq!(wrap_degrees(540.0), 180.0);
        assert_relative_eq!(wrap_degrees(-30.0), -30.0);
    }

    #[test]
    fn test_distance_quarter_meridian() {
        let d = great_circle_distance(GeoPos::new(0.0, 0.0), GeoPos::new(90.0, 0.0));
        assert_relative_eq!(d, EARTH_RADIUS_M * PI / 2.0, max_relative = 1e-12);
    }

    #[test]
    fn test_cardinal_bearings() {
        let origin = GeoPos::new(0.0, 0.0);
        assert_relative_eq!(bearing(origin, GeoPos::new(10.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, GeoPos::new(0.0, 10.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, GeoPos::new(-10.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_relative_eq!(bearing(origin, GeoPos::new(0.0, -10.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_destination_round_trip() {
        let start = GeoPos::new(45.0, 10.0);
        let end = destination_point(start, 60.0, 250_000.0);
        assert_relative_eq!(great_circle_distance(start, end), 250_000.0, max_relative = 1e-9);
        assert_relative_eq!(bearing(start, end), 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_relative_azimuth_edge_cases() {
        let point = GeoPos::new(0.0, 0.0);
        let antipode = GeoPos::new(0.0, 180.0);
        let pole = GeoPos::new(90.0, 0.0);

        let cases = [
            (point, point, point),
            (antipode, point, pole),
            (pole, pole, antipode),
            (GeoPos::new(-90.0, 0.0), pole, point),
            (point, GeoPos::new(89.9999999, 45.0), GeoPos::new(-89.9999999, -135.0)),
        ];
        for (sat, p, sun) in cases {
            let raa = relative_azimuth(40.0, sat, p, sun);
            assert!(raa.is_finite(), "NaN for {:?} {:?} {:?}", sat, p, sun);
            assert!(raa > -180.0 && raa <= 180.0);
        }
    }

    #[test]
    fn test_relative_azimuth_opposite_sides() {
        let point = GeoPos::new(0.0, 0.0);
        let raa = relative_azimuth(30.0, GeoPos::new(0.0, -5.0), point, GeoPos::new(0.0, 5.0));
        assert_relative_eq!(raa.abs(), 180.0, epsilon = 1e-9);
        assert_eq!(relative_azimuth(0.0, GeoPos::new(0.0, -5.0), point, GeoPos::new(0.0, 5.0)), 0.0);
    }

    #[test]
    fn test_glint_specular() {
        assert_relative_eq!(glint_angle(30.0, 30.0, 180.0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(glint_angle(30.0, 30.0, 0.0), 60.0, epsilon = 1e-9);
    }
}
