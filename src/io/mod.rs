//! Artifact readers, product naming and collaborator contracts

pub mod net_reader;
pub mod product;
pub mod services;

pub use net_reader::parse_net;
pub use product::{parse_platform, parse_product_date, ProductDate};
pub use services::{
    ElevationService, GeoCoding, RegularGeoCoding, SeaIceClassification, SeaIceClimatology,
    WaterMaskService,
};
