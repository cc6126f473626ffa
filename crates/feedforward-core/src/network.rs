use crate::config::{validate_layer_sizes, ConfigError, NetworkConfig};
use crate::nn::{Layer, ShapeError};
use crate::params::{GaussianInit, ParamSource};
use crate::trace::ActivationTrace;
use std::{error::Error, fmt};

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    Config(ConfigError),
    /// The first layer must take no inputs.
    FirstLayerHasInputs { num_inputs: usize },
    LayerWidthMismatch {
        layer: usize,
        expected: usize,
        actual: usize,
    },
    UnitWidthMismatch {
        layer: usize,
        unit: usize,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Config(e) => write!(f, "{}", e),
            NetworkError::FirstLayerHasInputs { num_inputs } => write!(
                f,
                "first layer must take 0 inputs per unit, got {num_inputs}"
            ),
            NetworkError::LayerWidthMismatch {
                layer,
                expected,
                actual,
            } => write!(
                f,
                "layer {layer} takes {actual} inputs per unit but the previous layer has {expected} units"
            ),
            NetworkError::UnitWidthMismatch {
                layer,
                unit,
                expected,
                actual,
            } => write!(
                f,
                "layer {layer} unit {unit} has {actual} weights, expected {expected}"
            ),
        }
    }
}

impl From<ConfigError> for NetworkError {
    fn from(err: ConfigError) -> Self {
        NetworkError::Config(err)
    }
}

impl Error for NetworkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetworkError::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// Fully-connected sigmoid network. Immutable once built, so one instance can
/// serve any number of forward passes.
#[derive(Clone, Debug, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
}

impl Default for Network {
    /// `[3, 3, 3]` with standard-normal parameters from OS entropy.
    fn default() -> Self {
        Self::new(&NetworkConfig::DEFAULT_LAYER_SIZES)
    }
}

impl Network {
    /// Standard-normal parameters from OS entropy. Panics on invalid sizes.
    pub fn new(layer_sizes: &[usize]) -> Self {
        Self::try_new(layer_sizes, &mut GaussianInit::standard()).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Layer 0 gets `layer_sizes[0]` units with no inputs; layer `i` gets
    /// `layer_sizes[i]` units reading the `layer_sizes[i - 1]` outputs before it.
    pub fn try_new(
        layer_sizes: &[usize],
        source: &mut impl ParamSource,
    ) -> Result<Self, NetworkError> {
        let signed: Vec<i64> = layer_sizes
            .iter()
            .map(|&s| i64::try_from(s).unwrap_or(i64::MAX))
            .collect();
        let sizes = validate_layer_sizes(&signed)?;

        let mut layers = Vec::with_capacity(sizes.len());
        let mut num_inputs = 0;
        for &num_units in &sizes {
            layers.push(Layer::new(num_units, num_inputs, &mut *source));
            num_inputs = num_units;
        }
        tracing::debug!(?sizes, "built network");
        Ok(Self { layers })
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self, NetworkError> {
        let sizes = config.layer_sizes()?;
        let mut init = GaussianInit::from_config(config)?;
        Self::try_new(&sizes, &mut init)
    }

    /// Assembles a network from prebuilt layers, checking that the first layer
    /// takes no inputs and every later layer reads its predecessor's width.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self, NetworkError> {
        let first = layers
            .first()
            .ok_or(NetworkError::Config(ConfigError::EmptyLayerSizes))?;
        if first.num_inputs() != 0 {
            return Err(NetworkError::FirstLayerHasInputs {
                num_inputs: first.num_inputs(),
            });
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[1].num_inputs() != pair[0].len() {
                return Err(NetworkError::LayerWidthMismatch {
                    layer: i + 1,
                    expected: pair[0].len(),
                    actual: pair[1].num_inputs(),
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(Layer::len).collect()
    }

    /// Runs `input` through every layer and returns the input followed by each
    /// layer's output.
    ///
    /// Layer 0 has no weights: it is activated with an empty vector and emits
    /// `sigmoid(bias)` per unit. `input` is recorded as the first trace entry
    /// but never enters a weighted sum, so any input length is accepted.
    pub fn forward(&self, input: &[f64]) -> Result<ActivationTrace, ShapeError> {
        let mut outputs = Vec::with_capacity(self.layers.len() + 1);
        outputs.push(input.to_vec());

        let mut current: Vec<f64> = Vec::new();
        for layer in &self.layers {
            current = layer.activate(&current)?;
            outputs.push(current.clone());
        }
        tracing::debug!(
            input_len = input.len(),
            layers = self.layers.len(),
            "forward pass complete"
        );
        Ok(ActivationTrace::new(outputs))
    }
}
