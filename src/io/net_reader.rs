//! Reader for the line-oriented neural-network artifact.
//!
//! ```text
//! # comment
//! inputs 2
//! range 0.0 90.0
//! range 0.0 12.0
//! outputs 1
//! range 0.0 5.0
//! planes 3 2 4 1
//! bias 1
//! 0.1 0.2 0.3 0.4
//! bias 2
//! -0.5
//! weights 1
//! ...
//! ```
//!
//! `planes` gives the plane count followed by the size of every plane. Each
//! non-input plane `k` needs one `bias k` block (one value per node) and one
//! `weights k` block (`size(k) x size(k-1)` values, row-major). Values may
//! wrap across lines.

use crate::core::neural_net::{NetLayer, NeuralNet};
use crate::types::{CirrusError, CirrusResult};

/// Largest node count accepted for a single plane
pub const MAX_PLANE_SIZE: usize = 4096;

struct Tokens<'a> {
    tokens: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(i, line)| {
                let content = line.split('#').next().unwrap_or("");
                content.split_whitespace().map(move |t| (i + 1, t))
            })
            .collect();
        Self { tokens, pos: 0 }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(line, _)| *line)
            .unwrap_or(0)
    }

    fn error(&self, message: impl Into<String>) -> CirrusError {
        CirrusError::Artifact {
            line: self.line(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|(_, t)| *t)
    }

    fn next(&mut self, what: &str) -> CirrusResult<&'a str> {
        let token = self
            .peek()
            .ok_or_else(|| self.error(format!("unexpected end of artifact, expected {}", what)))?;
        self.pos += 1;
        Ok(token)
    }

    fn keyword(&mut self, expected: &str) -> CirrusResult<()> {
        let token = self.next(expected)?;
        if token != expected {
            self.pos -= 1;
            return Err(self.error(format!("expected '{}', found '{}'", expected, token)));
        }
        Ok(())
    }

    fn count(&mut self, what: &str) -> CirrusResult<usize> {
        let token = self.next(what)?;
        token.parse::<usize>().map_err(|_| {
            self.pos -= 1;
            self.error(format!("invalid {} '{}'", what, token))
        })
    }

    fn value(&mut self, what: &str) -> CirrusResult<f64> {
        let token = self.next(what)?;
        match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => {
                self.pos -= 1;
                Err(self.error(format!("invalid {} '{}'", what, token)))
            }
        }
    }

    fn values(&mut self, n: usize, what: &str) -> CirrusResult<Vec<f64>> {
        (0..n).map(|_| self.value(what)).collect()
    }

    fn ranges(&mut self, n: usize) -> CirrusResult<Vec<(f64, f64)>> {
        (0..n)
            .map(|_| {
                self.keyword("range")?;
                let min = self.value("range minimum")?;
                let max = self.value("range maximum")?;
                if max < min {
                    self.pos -= 1;
                    return Err(self.error(format!("range maximum {} below minimum {}", max, min)));
                }
                Ok((min, max))
            })
            .collect()
    }
}

/// Parses a network artifact from raw bytes
pub fn parse_net(bytes: &[u8]) -> CirrusResult<NeuralNet> {
    let text = std::str::from_utf8(bytes).map_err(|e| CirrusError::Artifact {
        line: 0,
        message: format!("artifact is not UTF-8: {}", e),
    })?;
    let mut tokens = Tokens::new(text);

    tokens.keyword("inputs")?;
    let n_inputs = tokens.count("input count")?;
    let input_ranges = tokens.ranges(n_inputs)?;

    tokens.keyword("outputs")?;
    let n_outputs = tokens.count("output count")?;
    let output_ranges = tokens.ranges(n_outputs)?;

    tokens.keyword("planes")?;
    let n_planes = tokens.count("plane count")?;
    if n_planes < 2 {
        return Err(tokens.error("a network needs at least an input and an output plane"));
    }
    let sizes = (0..n_planes)
        .map(|_| {
            let size = tokens.count("plane size")?;
            if size == 0 || size > MAX_PLANE_SIZE {
                tokens.pos -= 1;
                return Err(tokens.error(format!("plane size {} outside 1..={}", size, MAX_PLANE_SIZE)));
            }
            Ok(size)
        })
        .collect::<CirrusResult<Vec<_>>>()?;
    if sizes[0] != n_inputs || sizes[n_planes - 1] != n_outputs {
        return Err(tokens.error(format!(
            "plane sizes {:?} do not match {} inputs and {} outputs",
            sizes, n_inputs, n_outputs
        )));
    }

    let mut biases: Vec<Option<Vec<f64>>> = vec![None; n_planes];
    let mut weights: Vec<Option<Vec<f64>>> = vec![None; n_planes];

    while let Some(block) = tokens.peek() {
        let is_bias = match block {
            "bias" => true,
            "weights" => false,
            other => return Err(tokens.error(format!("unexpected token '{}'", other))),
        };
        tokens.pos += 1;
        let plane = tokens.count("plane index")?;
        if plane == 0 || plane >= n_planes {
            tokens.pos -= 1;
            return Err(tokens.error(format!("plane index {} out of range 1..{}", plane, n_planes)));
        }

        let n = if is_bias {
            sizes[plane]
        } else {
            sizes[plane]
                .checked_mul(sizes[plane - 1])
                .ok_or_else(|| tokens.error(format!("weight count of plane {} overflows", plane)))?
        };
        let slot = if is_bias { &mut biases[plane] } else { &mut weights[plane] };
        if slot.is_some() {
            tokens.pos -= 1;
            return Err(tokens.error(format!("duplicate {} block for plane {}", block, plane)));
        }
        *slot = Some(tokens.values(n, block)?);
    }

    let mut layers = Vec::with_capacity(n_planes - 1);
    for plane in 1..n_planes {
        let bias = biases[plane]
            .take()
            .ok_or_else(|| tokens.error(format!("missing bias block for plane {}", plane)))?;
        let w = weights[plane]
            .take()
            .ok_or_else(|| tokens.error(format!("missing weights block for plane {}", plane)))?;
        layers.push(NetLayer::new(sizes[plane - 1], sizes[plane], w, bias)?);
    }

    log::debug!("Parsed neural net with planes {:?}", sizes);
    NeuralNet::new(input_ranges, output_ranges, layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_NET: &str = "\
# two inputs, one hidden plane
inputs 2
range 0 1
range 0 1
outputs 1
range 0 5
planes 3 2 2 1
bias 1
0 0
bias 2 0
weights 1
1 0
0 1
weights 2 1
1
";

    #[test]
    fn test_parse_small_net() {
        let net = parse_net(SMALL_NET.as_bytes()).unwrap();
        assert_eq!(net.input_count(), 2);
        assert_eq!(net.output_count(), 1);
        assert_eq!(net.layers().len(), 2);
    }

    #[test]
    fn test_missing_block_reported() {
        let truncated = SMALL_NET.replace("weights 2 1\n1\n", "");
        match parse_net(truncated.as_bytes()) {
            Err(CirrusError::Artifact { message, .. }) => assert!(message.contains("weights")),
            other => panic!("expected artifact error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_bad_value_carries_line() {
        let broken = SMALL_NET.replace("0 1\nweights 2", "0 x\nweights 2");
        match parse_net(broken.as_bytes()) {
            Err(CirrusError::Artifact { line, .. }) => assert_eq!(line, 13),
            other => panic!("expected artifact error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_plane_mismatch_rejected() {
        let wrong = SMALL_NET.replace("planes 3 2 2 1", "planes 3 3 2 1");
        assert!(parse_net(wrong.as_bytes()).is_err());
    }

    #[test]
    fn test_oversized_plane_is_artifact_error() {
        let huge = SMALL_NET.replace("planes 3 2 2 1", "planes 3 2 18446744073709551615 1");
        match parse_net(huge.as_bytes()) {
            Err(CirrusError::Artifact { line, message }) => {
                assert_eq!(line, 7);
                assert!(message.contains("plane size"));
            }
            other => panic!("expected artifact error, got {:?}", other.map(|_| ())),
        }

        let above_limit = SMALL_NET.replace("planes 3 2 2 1", &format!("planes 3 2 {} 1", MAX_PLANE_SIZE + 1));
        assert!(matches!(parse_net(above_limit.as_bytes()), Err(CirrusError::Artifact { .. })));
    }

    #[test]
    fn test_empty_plane_rejected() {
        let empty = SMALL_NET.replace("planes 3 2 2 1", "planes 3 2 0 1");
        assert!(matches!(parse_net(empty.as_bytes()), Err(CirrusError::Artifact { .. })));
    }
}
