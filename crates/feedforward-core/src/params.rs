use crate::config::{ConfigError, NetworkConfig};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rand_distr::{Distribution, Normal};

/// Supplies initial parameters while a network is being built.
///
/// Units pull all of their weights in index order and then their bias, so a
/// source that tracks call order can reproduce an exact parameter layout.
pub trait ParamSource {
    fn weight(&mut self) -> f64;
    fn bias(&mut self) -> f64;
}

impl<P: ParamSource + ?Sized> ParamSource for &mut P {
    fn weight(&mut self) -> f64 {
        (**self).weight()
    }

    fn bias(&mut self) -> f64 {
        (**self).bias()
    }
}

/// Independent normal draws for every weight and bias.
#[derive(Clone, Debug)]
pub struct GaussianInit<R> {
    rng: R,
    dist: Normal<f64>,
}

impl<R: Rng> GaussianInit<R> {
    pub fn new(rng: R, mean: f64, std_dev: f64) -> Result<Self, ConfigError> {
        if !mean.is_finite() {
            return Err(ConfigError::InvalidMean(mean));
        }
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(ConfigError::InvalidStdDev(std_dev));
        }
        let dist = Normal::new(mean, std_dev).map_err(|_| ConfigError::InvalidStdDev(std_dev))?;
        Ok(Self { rng, dist })
    }
}

impl GaussianInit<ChaCha12Rng> {
    pub fn from_seed(seed: u64, mean: f64, std_dev: f64) -> Result<Self, ConfigError> {
        Self::new(ChaCha12Rng::seed_from_u64(seed), mean, std_dev)
    }

    pub fn from_entropy(mean: f64, std_dev: f64) -> Result<Self, ConfigError> {
        Self::new(ChaCha12Rng::from_os_rng(), mean, std_dev)
    }

    /// Seeded when the config carries a seed, entropy-backed otherwise.
    pub fn from_config(config: &NetworkConfig) -> Result<Self, ConfigError> {
        match config.seed {
            Some(seed) => Self::from_seed(seed, config.init_mean, config.init_std_dev),
            None => Self::from_entropy(config.init_mean, config.init_std_dev),
        }
    }

    /// Standard normal (mean 0, std_dev 1) from OS entropy.
    pub fn standard() -> Self {
        Self {
            rng: ChaCha12Rng::from_os_rng(),
            dist: Normal::new(0.0, 1.0).unwrap_or_else(|e| panic!("{e}")),
        }
    }
}

impl<R: Rng> ParamSource for GaussianInit<R> {
    fn weight(&mut self) -> f64 {
        self.dist.sample(&mut self.rng)
    }

    fn bias(&mut self) -> f64 {
        self.dist.sample(&mut self.rng)
    }
}

/// Every weight and every bias gets the same fixed value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantInit {
    pub weight: f64,
    pub bias: f64,
}

impl ParamSource for ConstantInit {
    fn weight(&mut self) -> f64 {
        self.weight
    }

    fn bias(&mut self) -> f64 {
        self.bias
    }
}
