#![allow(dead_code)]

use chrono::NaiveDate;
use ndarray::Array2;
use std::fmt::Write;
use std::sync::Arc;

use cirrus::core::constants::NN_OUTPUT_MAX;
use cirrus::core::radiometry;
use cirrus::{NeuralNet, PixelObservation, SceneInputs, SensorProfile};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Single-plane network artifact text
pub fn net_text(input_ranges: &[(f64, f64)], weights: &[f64], bias: f64) -> String {
    let mut text = String::from("# generated test network\n");
    writeln!(text, "inputs {}", input_ranges.len()).unwrap();
    for (lo, hi) in input_ranges {
        writeln!(text, "range {} {}", lo, hi).unwrap();
    }
    writeln!(text, "outputs 1\nrange 0 {}", NN_OUTPUT_MAX).unwrap();
    writeln!(text, "planes 2 {} 1", input_ranges.len()).unwrap();
    writeln!(text, "bias 1\n{}", bias).unwrap();
    let row: Vec<String> = weights.iter().map(|w| w.to_string()).collect();
    writeln!(text, "weights 1\n{}", row.join(" ")).unwrap();
    text
}

fn logit(value: f64) -> f64 {
    let p = value / NN_OUTPUT_MAX;
    (p / (1.0 - p)).ln()
}

pub fn constant_net_text(value: f64, inputs: usize) -> String {
    net_text(&vec![(0.0, 1.0); inputs], &vec![0.0; inputs], logit(value))
}

pub fn constant_net(value: f64, inputs: usize) -> Arc<NeuralNet> {
    Arc::new(NeuralNet::from_bytes(constant_net_text(value, inputs).as_bytes()).unwrap())
}

/// Network driven by sun zenith alone: 1.0 (clear) at 30 degrees, 3.5 (sure cloud) at 60 degrees
pub fn sun_zenith_net(inputs: usize) -> Arc<NeuralNet> {
    let (low, high) = (logit(1.0), logit(3.5));
    // input 0 is normalised over 0..90, so 30 and 60 degrees map to 1/3 and 2/3
    let w = 3.0 * (high - low);
    let bias = low - w / 3.0;
    let mut ranges = vec![(0.0, 1.0); inputs];
    ranges[0] = (0.0, 90.0);
    let mut weights = vec![0.0; inputs];
    weights[0] = w;
    Arc::new(NeuralNet::from_bytes(net_text(&ranges, &weights, bias).as_bytes()).unwrap())
}

/// Clear land pixel: albedo 20/25 %, brightness temperatures 252/250/245 K
pub fn clear_land(profile: &SensorProfile) -> PixelObservation {
    let mut obs = PixelObservation {
        sun_zenith: 30.0,
        view_zenith: 20.0,
        relative_azimuth: 60.0,
        water_fraction: 0,
        latitude: 48.0,
        longitude: 11.0,
        ..Default::default()
    };
    obs.channels[0] = 20.0;
    obs.channels[1] = 25.0;
    obs.channels[2] = radiometry::bt_to_radiance(252.0, profile, 2).unwrap();
    obs.channels[3] = radiometry::bt_to_radiance(250.0, profile, 3).unwrap();
    obs.channels[4] = radiometry::bt_to_radiance(245.0, profile, 4).unwrap();
    obs
}

/// Scene of clear-land channel values on a 0.01 degree grid north of 48N
pub fn uniform_scene(
    profile: &SensorProfile,
    rows: usize,
    cols: usize,
    sun_zenith: impl Fn(usize, usize) -> f32,
) -> SceneInputs {
    let template = clear_land(profile);
    let channels = (0..profile.channels.len())
        .map(|i| Array2::from_elem((rows, cols), template.channels[i] as f32))
        .collect();
    let mut inputs = SceneInputs::new(
        NaiveDate::from_ymd_opt(2008, 7, 15).unwrap(),
        Array2::from_shape_fn((rows, cols), |(y, x)| sun_zenith(y, x)),
        Array2::from_shape_fn((rows, cols), |(y, _)| 48.0 - 0.01 * y as f32),
        Array2::from_shape_fn((rows, cols), |(_, x)| 11.0 + 0.01 * x as f32),
        channels,
    )
    .unwrap();
    inputs.view_zenith = Some(Array2::from_elem((rows, cols), 20.0));
    inputs.relative_azimuth = Some(Array2::from_elem((rows, cols), 60.0));
    inputs
}
