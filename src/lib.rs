//! Cirrus: per-pixel cloud, snow/ice and land/water classification for
//! AVHRR-class radiometer imagery.
//!
//! Pixels are classified independently from calibrated channel values,
//! geometry and a surface mask, combining a threshold decision tree with a
//! neural-network cloud probability. A second stage refines the flag raster
//! spatially (coastline cleanup, cloud buffer, cloud shadow).

pub mod core;
pub mod io;
pub mod types;

pub(crate) mod maybe_rayon;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    CirrusError, CirrusResult, ClassificationFlags, DerivedQuantities, GeoPos, PixelObservation,
    Rect, WaterClass,
};

pub use crate::core::{
    ClassificationProduct, ClassifierConfig, LookupTables, NeuralNet, PixelClassifier,
    SceneClassifier, SceneInputs, SensorProfile, SpatialPostProcessor,
};
