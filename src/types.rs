use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Maximum number of radiometer channels carried by one observation
pub const MAX_CHANNELS: usize = 5;

/// Water-fraction values above this are the "no data" sentinel
pub const WATER_FRACTION_MAX: u8 = 100;

/// Packed per-pixel classification flags.
///
/// Bits 0-9 are the named classification bits, bits 10 and up carry the
/// individual decision-tree test outcomes as diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClassificationFlags(u32);

impl ClassificationFlags {
    pub const NONE: Self = Self(0);
    pub const INVALID: Self = Self(1 << 0);
    pub const CLOUD: Self = Self(1 << 1);
    pub const CLOUD_AMBIGUOUS: Self = Self(1 << 2);
    pub const CLOUD_SURE: Self = Self(1 << 3);
    pub const CLOUD_BUFFER: Self = Self(1 << 4);
    pub const CLOUD_SHADOW: Self = Self(1 << 5);
    pub const SNOW_ICE: Self = Self(1 << 6);
    pub const GLINT_RISK: Self = Self(1 << 7);
    pub const COASTLINE: Self = Self(1 << 8);
    pub const LAND: Self = Self(1 << 9);
    // Decision-tree diagnostics
    pub const RGCT: Self = Self(1 << 10);
    pub const RRCT: Self = Self(1 << 11);
    pub const C3AT: Self = Self(1 << 12);
    pub const TGCT: Self = Self(1 << 13);
    pub const FMFT: Self = Self(1 << 14);
    pub const TMFT_CLEAR: Self = Self(1 << 15);
    pub const EMISSIVITY_CLOUD: Self = Self(1 << 16);
    pub const DESERT: Self = Self(1 << 17);

    /// All cloud-class bits cleared together by refinement passes
    pub const ANY_CLOUD: Self =
        Self(Self::CLOUD.0 | Self::CLOUD_AMBIGUOUS.0 | Self::CLOUD_SURE.0);

    /// Flag names in bit order, as written into flag-coding metadata
    pub const NAMES: [(&'static str, ClassificationFlags); 18] = [
        ("INVALID", Self::INVALID),
        ("CLOUD", Self::CLOUD),
        ("CLOUD_AMBIGUOUS", Self::CLOUD_AMBIGUOUS),
        ("CLOUD_SURE", Self::CLOUD_SURE),
        ("CLOUD_BUFFER", Self::CLOUD_BUFFER),
        ("CLOUD_SHADOW", Self::CLOUD_SHADOW),
        ("SNOW_ICE", Self::SNOW_ICE),
        ("GLINT_RISK", Self::GLINT_RISK),
        ("COASTLINE", Self::COASTLINE),
        ("LAND", Self::LAND),
        ("RGCT", Self::RGCT),
        ("RRCT", Self::RRCT),
        ("C3AT", Self::C3AT),
        ("TGCT", Self::TGCT),
        ("FMFT", Self::FMFT),
        ("TMFT_CLEAR", Self::TMFT_CLEAR),
        ("EMISSIVITY_CLOUD", Self::EMISSIVITY_CLOUD),
        ("DESERT", Self::DESERT),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Self, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    pub const fn is_invalid(self) -> bool {
        self.contains(Self::INVALID)
    }

    pub const fn is_cloud(self) -> bool {
        self.contains(Self::CLOUD)
    }

    /// Valid pixel that is neither cloud nor already shadowed
    pub const fn is_clear(self) -> bool {
        !self.intersects(Self(Self::INVALID.0 | Self::CLOUD.0 | Self::CLOUD_SHADOW.0))
    }

    /// Checks the structural invariants every emitted flag word must satisfy
    pub fn is_consistent(self) -> bool {
        if self.is_invalid() {
            return self == Self::INVALID;
        }
        let cloud_parts = self.intersects(Self::CLOUD_AMBIGUOUS) || self.contains(Self::CLOUD_SURE);
        self.is_cloud() == cloud_parts
            && !(self.contains(Self::SNOW_ICE) && self.contains(Self::CLOUD_SURE))
            && !(self.contains(Self::CLOUD_AMBIGUOUS) && self.contains(Self::CLOUD_SURE))
    }
}

impl BitOr for ClassificationFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClassificationFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ClassificationFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for ClassificationFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, bit)| self.contains(*bit))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "CLEAR")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Geodetic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPos {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPos {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=360.0).contains(&self.lon)
    }
}

/// Surface class returned by the water-mask service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WaterClass {
    Land,
    Water,
    #[default]
    Invalid,
}

/// Immutable per-pixel input to the classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelObservation {
    pub sun_zenith: f64,       // degrees
    pub view_zenith: f64,      // degrees
    pub relative_azimuth: f64, // degrees, 180 = specular geometry
    /// Native channel values in profile order: albedo (%) for reflective
    /// channels, radiance (mW m-2 sr-1 cm) for emissive ones
    pub channels: [f64; MAX_CHANNELS],
    /// Water fraction 0-100, values above 100 mean no data
    pub water_fraction: u8,
    /// Surface class from the water-mask sample, used when fractions are off
    pub water_class: WaterClass,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>, // meters
    /// Earth-sun distance correction for the acquisition day
    pub distance_correction: f64,
    /// Climatological maximum sea-ice concentration, when a climatology is attached
    pub sea_ice_max_concentration: Option<f64>,
}

impl Default for PixelObservation {
    fn default() -> Self {
        Self {
            sun_zenith: f64::NAN,
            view_zenith: f64::NAN,
            relative_azimuth: f64::NAN,
            channels: [f64::NAN; MAX_CHANNELS],
            water_fraction: u8::MAX,
            water_class: WaterClass::Invalid,
            latitude: f64::NAN,
            longitude: f64::NAN,
            elevation: None,
            distance_correction: 1.0,
            sea_ice_max_concentration: None,
        }
    }
}

/// Physical quantities derived from one observation.
///
/// Absent quantities (e.g. thermal values for a reflective-only sensor)
/// are NaN. Brightness temperatures are Kelvin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedQuantities {
    pub albedo: [f64; MAX_CHANNELS],   // percent, reflective channels only
    pub radiance: [f64; MAX_CHANNELS], // every channel
    pub brightness_temp: [f64; MAX_CHANNELS],
    pub emissivity_3b: f64,
    pub rho_3b: f64,
    pub ndvi: f64,
    pub ndsi: f64,
    pub glint_angle: f64, // degrees
}

impl Default for DerivedQuantities {
    fn default() -> Self {
        Self {
            albedo: [f64::NAN; MAX_CHANNELS],
            radiance: [f64::NAN; MAX_CHANNELS],
            brightness_temp: [f64::NAN; MAX_CHANNELS],
            emissivity_3b: f64::NAN,
            rho_3b: f64::NAN,
            ndvi: f64::NAN,
            ndsi: f64::NAN,
            glint_angle: f64::NAN,
        }
    }
}

/// Pixel rectangle in raster coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole raster of the given (rows, cols) shape
    pub const fn from_dim(dim: (usize, usize)) -> Self {
        Self::new(0, 0, dim.1, dim.0)
    }

    pub const fn x_end(&self) -> usize {
        self.x + self.width
    }

    pub const fn y_end(&self) -> usize {
        self.y + self.height
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.x_end() && y >= self.y && y < self.y_end()
    }

    /// True when `other` lies completely inside `self`
    pub const fn encloses(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x_end() <= self.x_end()
            && other.y_end() <= self.y_end()
    }

    /// Grows the rectangle by `margin` on every side, clipped to `bounds`
    pub fn expand(&self, margin: usize, bounds: &Rect) -> Rect {
        let x = self.x.saturating_sub(margin).max(bounds.x);
        let y = self.y.saturating_sub(margin).max(bounds.y);
        let x_end = (self.x_end() + margin).min(bounds.x_end());
        let y_end = (self.y_end() + margin).min(bounds.y_end());
        Rect::new(x, y, x_end.saturating_sub(x), y_end.saturating_sub(y))
    }
}

/// Error types for classification setup and processing
#[derive(Debug, thiserror::Error)]
pub enum CirrusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Neural net artifact error at line {line}: {message}")]
    Artifact { line: usize, message: String },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for classification operations
pub type CirrusResult<T> = Result<T, CirrusError>;
