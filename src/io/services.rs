//! Collaborator contracts consumed by the classifier.
//!
//! The classifier never reads masks, DEMs or climatologies itself; a host
//! supplies them through these traits (or as ready-made rasters).

use serde::{Deserialize, Serialize};

use crate::types::{CirrusError, CirrusResult, GeoPos, WaterClass};

/// Land/water mask lookup
pub trait WaterMaskService: Send + Sync {
    /// Water fraction 0-100, values above 100 mean no data
    fn water_fraction(&self, pos: GeoPos) -> u8;

    fn water_sample(&self, pos: GeoPos) -> WaterClass;
}

/// Surface elevation lookup
pub trait ElevationService: Send + Sync {
    /// Elevation above sea level, meters
    fn elevation(&self, pos: GeoPos) -> CirrusResult<f64>;
}

/// Climatological sea-ice record of one location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeaIceClassification {
    /// Maximum sea-ice concentration, percent
    pub max_concentration: f64,
}

/// Sea-ice climatology lookup
pub trait SeaIceClimatology: Send + Sync {
    /// `None` where the climatology has no record
    fn classification(&self, pos: GeoPos) -> Option<SeaIceClassification>;
}

/// Forward and inverse pixel geolocation
pub trait GeoCoding: Send + Sync {
    /// Position of the pixel centre at (x, y)
    fn pixel_to_geo(&self, x: f64, y: f64) -> GeoPos;

    /// Fractional pixel coordinates (x, y) of a position, if it maps into the grid
    fn geo_to_pixel(&self, pos: GeoPos) -> Option<(f64, f64)>;
}

/// Regular latitude/longitude grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegularGeoCoding {
    /// Latitude of the centre of row 0
    pub origin_lat: f64,
    /// Longitude of the centre of column 0
    pub origin_lon: f64,
    /// Latitude increment per row (negative for north-up grids)
    pub lat_step: f64,
    /// Longitude increment per column
    pub lon_step: f64,
}

impl RegularGeoCoding {
    pub fn new(origin_lat: f64, origin_lon: f64, lat_step: f64, lon_step: f64) -> CirrusResult<Self> {
        if lat_step == 0.0 || lon_step == 0.0 || !lat_step.is_finite() || !lon_step.is_finite() {
            return Err(CirrusError::Configuration(format!(
                "degenerate geocoding steps ({}, {})",
                lat_step, lon_step
            )));
        }
        Ok(Self { origin_lat, origin_lon, lat_step, lon_step })
    }
}

impl GeoCoding for RegularGeoCoding {
    fn pixel_to_geo(&self, x: f64, y: f64) -> GeoPos {
        GeoPos::new(self.origin_lat + y * self.lat_step, self.origin_lon + x * self.lon_step)
    }

    fn geo_to_pixel(&self, pos: GeoPos) -> Option<(f64, f64)> {
        if !pos.is_valid() {
            return None;
        }
        Some(((pos.lon - self.origin_lon) / self.lon_step, (pos.lat - self.origin_lat) / self.lat_step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_regular_geocoding_inverse() {
        let gc = RegularGeoCoding::new(60.0, -10.0, -0.05, 0.05).unwrap();
        let pos = gc.pixel_to_geo(12.0, 7.0);
        assert_relative_eq!(pos.lat, 59.65, epsilon = 1e-12);
        assert_relative_eq!(pos.lon, -9.4, epsilon = 1e-12);
        let (x, y) = gc.geo_to_pixel(pos).unwrap();
        assert_relative_eq!(x, 12.0, epsilon = 1e-9);
        assert_relative_eq!(y, 7.0, epsilon = 1e-9);
        assert!(RegularGeoCoding::new(0.0, 0.0, 0.0, 1.0).is_err());
    }
}
