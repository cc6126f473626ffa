//! Sigmoid units and the fully-connected layers built from them.
//!
//! A `Unit` computes `sigmoid(bias + sum(w_i * x_i))`. A `Layer` applies every
//! unit to the same input vector and returns one output per unit.

use crate::params::ParamSource;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Largest f64 strictly below 1.0.
const SIGMOID_MAX: f64 = 1.0 - f64::EPSILON / 2.0;

/// `1 / (1 + e^-x)`, kept strictly inside (0, 1) for every finite `x`.
pub fn sigmoid(x: f64) -> f64 {
    let s = if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        // e^x cannot overflow for negative x
        let e = x.exp();
        e / (1.0 + e)
    };
    s.clamp(f64::MIN_POSITIVE, SIGMOID_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeError {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input length ({}) does not match expected length ({})",
            self.actual, self.expected
        )
    }
}

impl Error for ShapeError {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    weights: Vec<f64>,
    bias: f64,
}

impl Unit {
    pub fn new(num_inputs: usize, source: &mut impl ParamSource) -> Self {
        let weights = (0..num_inputs).map(|_| source.weight()).collect();
        let bias = source.bias();
        Self { weights, bias }
    }

    pub fn from_parts(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn num_inputs(&self) -> usize {
        self.weights.len()
    }

    pub fn activate(&self, inputs: &[f64]) -> Result<f64, ShapeError> {
        if inputs.len() != self.weights.len() {
            return Err(ShapeError {
                expected: self.weights.len(),
                actual: inputs.len(),
            });
        }
        let sum = self
            .weights
            .iter()
            .zip(inputs)
            .fold(self.bias, |acc, (w, x)| acc + w * x);
        Ok(sigmoid(sum))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    units: Vec<Unit>,
    num_inputs: usize,
}

impl Layer {
    pub fn new(num_units: usize, num_inputs: usize, source: &mut impl ParamSource) -> Self {
        let units = (0..num_units)
            .map(|_| Unit::new(num_inputs, &mut *source))
            .collect();
        Self { units, num_inputs }
    }

    /// Builds a layer from explicit units. Fails on the first unit whose weight
    /// count differs from `num_inputs`, reporting that unit's index.
    pub fn from_units(num_inputs: usize, units: Vec<Unit>) -> Result<Self, (usize, ShapeError)> {
        if let Some((idx, unit)) = units
            .iter()
            .enumerate()
            .find(|(_, u)| u.num_inputs() != num_inputs)
        {
            return Err((
                idx,
                ShapeError {
                    expected: num_inputs,
                    actual: unit.num_inputs(),
                },
            ));
        }
        Ok(Self { units, num_inputs })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn activate(&self, inputs: &[f64]) -> Result<Vec<f64>, ShapeError> {
        if inputs.len() != self.num_inputs {
            return Err(ShapeError {
                expected: self.num_inputs,
                actual: inputs.len(),
            });
        }
        self.units.iter().map(|u| u.activate(inputs)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ConstantInit, GaussianInit};
    use proptest::prelude::*;

    #[test]
    fn sigmoid_of_zero_is_one_half() {
        assert_eq!(sigmoid(0.0), 0.5);
    }

    #[test]
    fn sigmoid_saturates_without_touching_bounds() {
        for x in [-1.0e6, -800.0, -40.0, 40.0, 800.0, 1.0e6, f64::MAX, f64::MIN] {
            let s = sigmoid(x);
            assert!(s > 0.0 && s < 1.0, "sigmoid({x}) = {s}");
        }
    }

    #[test]
    fn unit_draws_weights_then_bias() {
        let mut init = ConstantInit {
            weight: 0.5,
            bias: -1.0,
        };
        let unit = Unit::new(3, &mut init);
        assert_eq!(unit.weights(), &[0.5, 0.5, 0.5]);
        assert_eq!(unit.bias(), -1.0);
    }

    #[test]
    fn unit_computes_weighted_sum_plus_bias() {
        let unit = Unit::from_parts(vec![1.0, -2.0], 0.5);
        let out = unit.activate(&[3.0, 1.0]).unwrap();
        assert_eq!(out, sigmoid(0.5 + 3.0 - 2.0));
    }

    #[test]
    fn zero_input_unit_is_sigmoid_of_bias() {
        let unit = Unit::from_parts(Vec::new(), 2.0);
        assert_eq!(unit.activate(&[]).unwrap(), sigmoid(2.0));
    }

    #[test]
    fn unit_rejects_wrong_input_length() {
        let unit = Unit::from_parts(vec![1.0, 1.0], 0.0);
        assert_eq!(
            unit.activate(&[1.0]),
            Err(ShapeError {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn layer_outputs_follow_unit_order() {
        let units = vec![
            Unit::from_parts(vec![1.0], 0.0),
            Unit::from_parts(vec![-1.0], 0.0),
        ];
        let layer = Layer::from_units(1, units).unwrap();
        let out = layer.activate(&[2.0]).unwrap();
        assert_eq!(out, vec![sigmoid(2.0), sigmoid(-2.0)]);
    }

    #[test]
    fn empty_layer_still_checks_input_width() {
        let mut init = ConstantInit {
            weight: 0.0,
            bias: 0.0,
        };
        let layer = Layer::new(0, 3, &mut init);
        assert!(layer.is_empty());
        assert_eq!(layer.activate(&[0.0; 3]).unwrap(), Vec::<f64>::new());
        assert!(layer.activate(&[0.0; 2]).is_err());
    }

    #[test]
    fn from_units_reports_mismatched_unit() {
        let units = vec![
            Unit::from_parts(vec![1.0, 1.0], 0.0),
            Unit::from_parts(vec![1.0], 0.0),
        ];
        let err = Layer::from_units(2, units).unwrap_err();
        assert_eq!(
            err,
            (
                1,
                ShapeError {
                    expected: 2,
                    actual: 1
                }
            )
        );
    }

    proptest! {
        #[test]
        fn sigmoid_stays_in_open_unit_interval(x in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
            let s = sigmoid(x);
            prop_assert!(s.is_finite());
            prop_assert!(s > 0.0 && s < 1.0);
        }

        #[test]
        fn layer_rejects_any_wrong_length(
            num_inputs in 0usize..8,
            len in 0usize..16,
            seed in any::<u64>(),
        ) {
            prop_assume!(len != num_inputs);
            let mut init = GaussianInit::from_seed(seed, 0.0, 1.0).unwrap();
            let layer = Layer::new(3, num_inputs, &mut init);
            let inputs = vec![0.1; len];
            prop_assert_eq!(
                layer.activate(&inputs),
                Err(ShapeError { expected: num_inputs, actual: len })
            );
        }

        #[test]
        fn unit_output_in_open_interval_for_bounded_inputs(
            inputs in proptest::collection::vec(-1.0e3f64..1.0e3, 0..8),
            seed in any::<u64>(),
        ) {
            let mut init = GaussianInit::from_seed(seed, 0.0, 1.0).unwrap();
            let unit = Unit::new(inputs.len(), &mut init);
            let out = unit.activate(&inputs).unwrap();
            prop_assert!(out > 0.0 && out < 1.0);
        }
    }
}
