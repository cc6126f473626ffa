use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{error::Error, fmt, fs, io};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Units per layer, first layer first. Signed so that a negative size in a
    /// config file is reported as a configuration error instead of a parse error.
    pub layer_sizes: Vec<i64>,
    pub init_mean: f64,
    pub init_std_dev: f64,
    /// `None` draws parameters from OS entropy; runs are then not reproducible.
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            layer_sizes: Self::DEFAULT_LAYER_SIZES.iter().map(|&s| s as i64).collect(),
            init_mean: 0.0,
            init_std_dev: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyLayerSizes,
    NegativeLayerSize { index: usize, size: i64 },
    LayerTooLarge { index: usize, size: usize, max: usize },
    InvalidStdDev(f64),
    InvalidMean(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyLayerSizes => write!(f, "layer_sizes must contain at least one layer"),
            ConfigError::NegativeLayerSize { index, size } => {
                write!(f, "layer_sizes[{index}] is negative ({size})")
            }
            ConfigError::LayerTooLarge { index, size, max } => write!(
                f,
                "layer_sizes[{index}] ({size}) exceeds supported maximum ({max})"
            ),
            ConfigError::InvalidStdDev(v) => {
                write!(f, "init_std_dev must be finite and non-negative, got {v}")
            }
            ConfigError::InvalidMean(v) => write!(f, "init_mean must be finite, got {v}"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug)]
pub enum ConfigLoadError {
    Io(io::Error),
    Json(serde_json::Error),
    Invalid(ConfigError),
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLoadError::Io(e) => write!(f, "cannot read config: {e}"),
            ConfigLoadError::Json(e) => write!(f, "cannot parse config: {e}"),
            ConfigLoadError::Invalid(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigLoadError::Io(e) => Some(e),
            ConfigLoadError::Json(e) => Some(e),
            ConfigLoadError::Invalid(e) => Some(e),
        }
    }
}

impl NetworkConfig {
    pub const DEFAULT_LAYER_SIZES: [usize; 3] = [3, 3, 3];
    pub const MAX_LAYER_SIZE: usize = 65_536;

    pub fn with_layer_sizes(sizes: &[usize]) -> Self {
        Self {
            layer_sizes: sizes.iter().map(|&s| s as i64).collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layer_sizes().map(|_| ())
    }

    /// Validated layer sizes. Also checks the initialization distribution so a
    /// config that passes here can always build a network.
    pub fn layer_sizes(&self) -> Result<Vec<usize>, ConfigError> {
        if !self.init_mean.is_finite() {
            return Err(ConfigError::InvalidMean(self.init_mean));
        }
        if !self.init_std_dev.is_finite() || self.init_std_dev < 0.0 {
            return Err(ConfigError::InvalidStdDev(self.init_std_dev));
        }
        validate_layer_sizes(&self.layer_sizes)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let text = fs::read_to_string(path).map_err(ConfigLoadError::Io)?;
        let config: Self = serde_json::from_str(&text).map_err(ConfigLoadError::Json)?;
        config.validate().map_err(ConfigLoadError::Invalid)?;
        Ok(config)
    }
}

pub fn validate_layer_sizes(sizes: &[i64]) -> Result<Vec<usize>, ConfigError> {
    if sizes.is_empty() {
        return Err(ConfigError::EmptyLayerSizes);
    }
    sizes
        .iter()
        .enumerate()
        .map(|(index, &size)| {
            let size = usize::try_from(size)
                .map_err(|_| ConfigError::NegativeLayerSize { index, size })?;
            if size > NetworkConfig::MAX_LAYER_SIZE {
                return Err(ConfigError::LayerTooLarge {
                    index,
                    size,
                    max: NetworkConfig::MAX_LAYER_SIZE,
                });
            }
            Ok(size)
        })
        .collect()
}
