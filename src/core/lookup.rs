//! Static lookup tables of the physical decision tree.
//!
//! Every table is built once by [`LookupTables::new`] and is read-only
//! afterwards. Out-of-range indices are clamped to the nearest bucket;
//! clamping is the extrapolation policy, never an error.

use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::core::constants::{ScanGeometry, EARTH_RADIUS_M};
use crate::types::{CirrusResult, GeoPos};

/// Table indexed by a quantized physical value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable1D<T> {
    values: Vec<T>,
    origin: T,
    step: T,
}

impl<T: Float> LookupTable1D<T> {
    /// `values[i]` belongs to the bucket centred on `origin + i * step`
    pub fn new(values: Vec<T>, origin: T, step: T) -> Self {
        assert!(!values.is_empty(), "lookup table must not be empty");
        Self { values, origin, step }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bucket index of `x`, clamped to the table
    pub fn index_of(&self, x: T) -> usize {
        let raw = ((x - self.origin) / self.step).round();
        let max = T::from(self.values.len() - 1).unwrap_or_else(T::zero);
        if raw.is_nan() || raw <= T::zero() {
            0
        } else if raw >= max {
            self.values.len() - 1
        } else {
            raw.to_usize().unwrap_or(0)
        }
    }

    /// Value at a signed index, clamped to the table
    pub fn at(&self, index: i64) -> T {
        let last = self.values.len() as i64 - 1;
        self.values[index.clamp(0, last) as usize]
    }

    pub fn lookup(&self, x: T) -> T {
        self.values[self.index_of(x)]
    }
}

/// Row-major 2-D table with independently clamped axes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupTable2D<T> {
    values: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Copy> LookupTable2D<T> {
    pub fn new(values: Vec<T>, rows: usize, cols: usize) -> Self {
        assert_eq!(values.len(), rows * cols, "table shape does not match value count");
        assert!(rows > 0 && cols > 0, "lookup table must not be empty");
        Self { values, rows, cols }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn at(&self, row: i64, col: i64) -> T {
        let r = row.clamp(0, self.rows as i64 - 1) as usize;
        let c = col.clamp(0, self.cols as i64 - 1) as usize;
        self.values[r * self.cols + c]
    }
}

/// Step function over ascending bucket upper edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFunction {
    upper_edges: Vec<f64>,
    values: Vec<f64>,
}

impl StepFunction {
    /// `values` has one more entry than `upper_edges`; the last bucket is open-ended
    pub fn new(upper_edges: Vec<f64>, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), upper_edges.len() + 1, "step function needs edges + 1 values");
        Self { upper_edges, values }
    }

    pub fn bucket_count(&self) -> usize {
        self.values.len()
    }

    pub fn bucket_of(&self, x: f64) -> usize {
        self.upper_edges
            .iter()
            .position(|&edge| x < edge)
            .unwrap_or(self.upper_edges.len())
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.values[self.bucket_of(x)]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Latitude/longitude rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBox {
    pub name: &'static str,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoBox {
    pub fn contains(&self, pos: GeoPos) -> bool {
        pos.lat >= self.min_lat
            && pos.lat <= self.max_lat
            && pos.lon >= self.min_lon
            && pos.lon <= self.max_lon
    }
}

pub const DESERT_REGIONS: [GeoBox; 4] = [
    GeoBox { name: "Sahara", min_lat: 15.0, max_lat: 35.0, min_lon: -17.0, max_lon: 33.0 },
    GeoBox { name: "Arabia", min_lat: 12.0, max_lat: 32.0, min_lon: 35.0, max_lon: 60.0 },
    GeoBox { name: "Central Asia", min_lat: 35.0, max_lat: 50.0, min_lon: 50.0, max_lon: 115.0 },
    GeoBox { name: "Australia", min_lat: -32.0, max_lat: -20.0, min_lon: 115.0, max_lon: 145.0 },
];

/// Number of TMFT brightness-temperature rows
pub const TMFT_ROWS: usize = 14;
/// TMFT columns: day min, day max, night min, night max
pub const TMFT_COLS: usize = 4;

/// Lower edge (K) and width of the TMFT bt4 buckets
const TMFT_BT4_ORIGIN: f64 = 200.0;
const TMFT_BT4_STEP: f64 = 10.0;

/// Clear-sky bt3-bt4 envelope per 10 K bt4 bucket from 200 K
#[rustfmt::skip]
const TMFT_ENVELOPE: [f64; TMFT_ROWS * TMFT_COLS] = [
    // day_min day_max night_min night_max
    -4.0, 30.0, -3.0, 4.0,  // 200
    -4.0, 28.0, -3.0, 3.5,  // 210
    -3.5, 26.0, -2.5, 3.0,  // 220
    -3.0, 24.0, -2.5, 2.5,  // 230
    -3.0, 22.0, -2.0, 2.5,  // 240
    -2.5, 20.0, -2.0, 2.0,  // 250
    -2.0, 18.0, -1.5, 2.0,  // 260
    -2.0, 16.0, -1.5, 2.0,  // 270
    -1.5, 14.0, -1.5, 1.5,  // 280
    -1.5, 13.0, -1.0, 1.5,  // 290
    -1.0, 12.0, -1.0, 1.5,  // 300
    -1.0, 11.0, -1.0, 1.5,  // 310
    -1.0, 10.0, -1.0, 1.0,  // 320
    -1.0,  9.0, -1.0, 1.0,  // 330
];

/// Split-window threshold anchors (bt4 K, bt4-bt5 K)
const FMFT_ANCHORS: [(f64, f64); 9] = [
    (200.0, 0.0),
    (240.0, 0.0),
    (260.0, 0.55),
    (270.0, 0.58),
    (280.0, 1.30),
    (290.0, 3.06),
    (300.0, 5.77),
    (310.0, 9.41),
    (320.0, 13.0),
];

/// FMFT table origin (K) and bucket count
pub const FMFT_ORIGIN: f64 = 200.0;
pub const FMFT_BUCKETS: usize = 121;

/// All static tables used during classification
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTables {
    pub rgct: StepFunction,
    pub fmft: LookupTable1D<f64>,
    pub tmft: LookupTable2D<f64>,
    pub vza_lac: LookupTable1D<f64>,
    pub vza_gac: LookupTable1D<f64>,
    pub deserts: Vec<GeoBox>,
}

impl LookupTables {
    /// Fails with a configuration error when the scan geometry is unusable
    pub fn new(scan: &ScanGeometry) -> CirrusResult<Self> {
        scan.validate()?;
        log::debug!(
            "Building lookup tables (FMFT {} buckets, TMFT {}x{}, VZA {}/{} samples)",
            FMFT_BUCKETS,
            TMFT_ROWS,
            TMFT_COLS,
            scan.lac_samples,
            scan.gac_samples
        );

        let rgct = StepFunction::new(
            vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5],
            vec![0.35, 0.30, 0.25, 0.20, 0.16, 0.13, 0.10],
        );

        let fmft_values: Vec<f64> = (0..FMFT_BUCKETS)
            .map(|i| interpolate_anchors(&FMFT_ANCHORS, FMFT_ORIGIN + i as f64))
            .collect();

        Ok(Self {
            rgct,
            fmft: LookupTable1D::new(fmft_values, FMFT_ORIGIN, 1.0),
            tmft: LookupTable2D::new(TMFT_ENVELOPE.to_vec(), TMFT_ROWS, TMFT_COLS),
            vza_lac: view_zenith_table(scan, scan.lac_samples),
            vza_gac: view_zenith_table(scan, scan.gac_samples),
            deserts: DESERT_REGIONS.to_vec(),
        })
    }

    /// FMFT split-window threshold for an 11 um brightness temperature
    pub fn fmft_threshold(&self, bt4: f64) -> f64 {
        self.fmft.lookup(bt4)
    }

    /// TMFT row index for an 11 um brightness temperature
    pub fn tmft_row(bt4: f64) -> i64 {
        if bt4.is_nan() {
            return 0;
        }
        ((bt4 - TMFT_BT4_ORIGIN) / TMFT_BT4_STEP).floor() as i64
    }

    /// Clear-sky (min, max) envelope of bt3-bt4
    pub fn tmft_envelope(&self, bt4: f64, day: bool) -> (f64, f64) {
        let row = Self::tmft_row(bt4);
        let col = if day { 0 } else { 2 };
        (self.tmft.at(row, col), self.tmft.at(row, col + 1))
    }

    /// View zenith of a column, selecting the table by scanline width
    pub fn view_zenith(&self, column: usize, scanline_width: usize) -> f64 {
        let table = if scanline_width <= self.vza_gac.len() {
            &self.vza_gac
        } else {
            &self.vza_lac
        };
        table.at(column as i64)
    }

    pub fn is_desert(&self, pos: GeoPos) -> bool {
        self.deserts.iter().any(|region| region.contains(pos))
    }
}

fn interpolate_anchors(anchors: &[(f64, f64)], x: f64) -> f64 {
    let first = anchors[0];
    let last = anchors[anchors.len() - 1];
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    anchors
        .windows(2)
        .find(|w| x >= w[0].0 && x <= w[1].0)
        .map(|w| {
            let t = (x - w[0].0) / (w[1].0 - w[0].0);
            w[0].1 + t * (w[1].1 - w[0].1)
        })
        .unwrap_or(last.1)
}

/// View zenith (degrees) per sample of a symmetric cross-track scan
fn view_zenith_table(scan: &ScanGeometry, samples: usize) -> LookupTable1D<f64> {
    let ratio = (EARTH_RADIUS_M + scan.altitude_km * 1000.0) / EARTH_RADIUS_M;
    let centre = (samples as f64 - 1.0) / 2.0;
    let step = if samples > 1 { scan.max_scan_angle / centre } else { 0.0 };

    let values = (0..samples)
        .map(|i| {
            let scan_angle = ((i as f64 - centre) * step).to_radians();
            (ratio * scan_angle.sin()).clamp(-1.0, 1.0).asin().to_degrees().abs()
        })
        .collect();

    LookupTable1D::new(values, 0.0, 1.0)
}
