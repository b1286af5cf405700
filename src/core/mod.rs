//! Core classification modules

pub mod cloud_buffer;
pub mod cloud_shadow;
pub mod coastline;
pub mod constants;
pub mod decision_tree;
pub mod geometry;
pub mod lookup;
pub mod neural_net;
pub mod pixel_classifier;
pub mod postprocess;
pub mod radiometry;
pub mod scene;

// Re-export main types
pub use cloud_shadow::{CloudShadowParams, ShadowInputs};
pub use coastline::CoastlineParams;
pub use constants::{ChannelRole, SensorProfile};
pub use decision_tree::{DecisionTreeClassifier, DecisionTreeResult};
pub use lookup::LookupTables;
pub use neural_net::NeuralNet;
pub use pixel_classifier::{NnBand, NnBoundaries, PixelClassifier, PixelClassifierParams, PixelResult};
pub use postprocess::{PostProcessContext, PostProcessParams, SpatialPostProcessor};
pub use scene::{
    ClassificationProduct, ClassifierConfig, DiagnosticBand, DiagnosticsConfig, SceneClassifier,
    SceneInputs,
};
