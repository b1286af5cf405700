//! Feed-forward neural network used as the primary cloud discriminant.
//!
//! A loaded [`NeuralNet`] is immutable. Inference writes only into a
//! caller-owned [`NetScratch`], so one network can be shared read-only
//! across worker threads with one scratch buffer per worker.

use std::path::Path;

use crate::core::constants::{SensorProfile, NN_ANGLE_INPUTS};
use crate::types::{CirrusError, CirrusResult, DerivedQuantities, PixelObservation};

/// One fully connected plane with logistic activation
#[derive(Debug, Clone, PartialEq)]
pub struct NetLayer {
    inputs: usize,
    outputs: usize,
    /// Row-major `outputs x inputs`
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl NetLayer {
    pub fn new(inputs: usize, outputs: usize, weights: Vec<f64>, bias: Vec<f64>) -> CirrusResult<Self> {
        if inputs == 0 || outputs == 0 {
            return Err(CirrusError::Configuration("network plane with zero nodes".to_string()));
        }
        let expected = inputs.checked_mul(outputs).ok_or_else(|| {
            CirrusError::Configuration(format!("plane {}x{} is too large", outputs, inputs))
        })?;
        if weights.len() != expected || bias.len() != outputs {
            return Err(CirrusError::Configuration(format!(
                "plane {}x{} needs {} weights and {} biases, got {} and {}",
                outputs,
                inputs,
                expected,
                outputs,
                weights.len(),
                bias.len()
            )));
        }
        Ok(Self { inputs, outputs, weights, bias })
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    fn forward(&self, input: &[f64], output: &mut Vec<f64>) {
        output.clear();
        output.extend(self.weights.chunks_exact(self.inputs).zip(&self.bias).map(|(row, b)| {
            let z: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b;
            logistic(z)
        }));
    }
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Per-worker buffers reused across `infer_with` calls
#[derive(Debug, Clone, Default)]
pub struct NetScratch {
    current: Vec<f64>,
    next: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNet {
    input_ranges: Vec<(f64, f64)>,
    output_ranges: Vec<(f64, f64)>,
    layers: Vec<NetLayer>,
}

impl NeuralNet {
    pub fn new(
        input_ranges: Vec<(f64, f64)>,
        output_ranges: Vec<(f64, f64)>,
        layers: Vec<NetLayer>,
    ) -> CirrusResult<Self> {
        let first = layers
            .first()
            .ok_or_else(|| CirrusError::Configuration("network without layers".to_string()))?;
        if first.inputs != input_ranges.len() {
            return Err(CirrusError::Configuration(format!(
                "first plane takes {} inputs but {} input ranges are given",
                first.inputs,
                input_ranges.len()
            )));
        }
        for pair in layers.windows(2) {
            if pair[0].outputs != pair[1].inputs {
                return Err(CirrusError::Configuration(format!(
                    "plane of {} nodes feeds a plane expecting {} inputs",
                    pair[0].outputs, pair[1].inputs
                )));
            }
        }
        let last = &layers[layers.len() - 1];
        if last.outputs != output_ranges.len() {
            return Err(CirrusError::Configuration(format!(
                "last plane has {} nodes but {} output ranges are given",
                last.outputs,
                output_ranges.len()
            )));
        }

        let degenerate = input_ranges.iter().filter(|(lo, hi)| hi <= lo).count();
        if degenerate > 0 {
            log::warn!(
                "{} network input(s) have a zero-width range and will be fed as 0",
                degenerate
            );
        }

        Ok(Self { input_ranges, output_ranges, layers })
    }

    pub fn from_bytes(bytes: &[u8]) -> CirrusResult<Self> {
        crate::io::net_reader::parse_net(bytes)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> CirrusResult<Self> {
        let path = path.as_ref();
        log::info!("Loading neural net from {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn input_count(&self) -> usize {
        self.input_ranges.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_ranges.len()
    }

    pub fn layers(&self) -> &[NetLayer] {
        &self.layers
    }

    pub fn output_ranges(&self) -> &[(f64, f64)] {
        &self.output_ranges
    }

    pub fn scratch(&self) -> NetScratch {
        let widest = self
            .layers
            .iter()
            .map(|l| l.outputs)
            .chain(std::iter::once(self.input_count()))
            .max()
            .unwrap_or(0);
        NetScratch {
            current: Vec::with_capacity(widest),
            next: Vec::with_capacity(widest),
        }
    }

    /// Runs the network; the returned slice borrows `scratch`.
    ///
    /// `input` must hold `input_count()` values; missing trailing inputs are fed as 0.
    pub fn infer_with<'s>(&self, input: &[f64], scratch: &'s mut NetScratch) -> &'s [f64] {
        debug_assert_eq!(input.len(), self.input_count());

        scratch.current.clear();
        scratch.current.extend(self.input_ranges.iter().enumerate().map(|(i, &(lo, hi))| {
            let x = input.get(i).copied().unwrap_or(0.0);
            if hi > lo {
                (x - lo) / (hi - lo)
            } else {
                0.0
            }
        }));

        for layer in &self.layers {
            layer.forward(&scratch.current, &mut scratch.next);
            std::mem::swap(&mut scratch.current, &mut scratch.next);
        }

        for (y, &(lo, hi)) in scratch.current.iter_mut().zip(&self.output_ranges) {
            *y = lo + *y * (hi - lo);
        }
        &scratch.current
    }

    pub fn infer(&self, input: &[f64]) -> Vec<f64> {
        let mut scratch = self.scratch();
        self.infer_with(input, &mut scratch).to_vec()
    }
}

/// Fills `input` with the network input vector of one pixel:
/// sun zenith, view zenith, |relative azimuth|, then the square root of each
/// profile NN channel's radiance.
///
/// Callers pass only valid pixels, so radiances are never negative here.
pub fn build_input(
    profile: &SensorProfile,
    obs: &PixelObservation,
    derived: &DerivedQuantities,
    input: &mut Vec<f64>,
) {
    input.clear();
    input.reserve(NN_ANGLE_INPUTS + profile.nn_input_channels.len());
    input.push(obs.sun_zenith);
    input.push(obs.view_zenith);
    input.push(obs.relative_azimuth.abs());
    input.extend(
        profile
            .nn_input_channels
            .iter()
            .map(|&ch| derived.radiance[ch].max(0.0).sqrt()),
    );
}
