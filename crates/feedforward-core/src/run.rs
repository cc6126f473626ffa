//! One-shot harness: build a network, run a single forward pass, persist the
//! trace. Computation errors abort before anything is written; a persistence
//! failure is carried in the outcome alongside the computed trace.

use crate::config::{ConfigError, NetworkConfig};
use crate::network::{Network, NetworkError};
use crate::nn::ShapeError;
use crate::trace::{read_document, write_document, ActivationTrace, TraceDocument, TraceError};
use std::path::Path;
use std::{error::Error, fmt};

pub const DEFAULT_OUTPUT_FILE: &str = "neuralNetwork.json";

#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Network(NetworkError),
    InputLength { expected: usize, actual: usize },
    NonFiniteInput { index: usize, value: f64 },
    Shape(ShapeError),
    Trace(TraceError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{}", e),
            RunError::Network(e) => write!(f, "{}", e),
            RunError::InputLength { expected, actual } => write!(
                f,
                "input has {actual} values but the first layer has {expected} units"
            ),
            RunError::NonFiniteInput { index, value } => {
                write!(f, "input[{index}] is not finite ({value})")
            }
            RunError::Shape(e) => write!(f, "{}", e),
            RunError::Trace(e) => write!(f, "{}", e),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RunError::Config(e) => Some(e),
            RunError::Network(e) => Some(e),
            RunError::Shape(e) => Some(e),
            RunError::Trace(e) => Some(e),
            RunError::InputLength { .. } | RunError::NonFiniteInput { .. } => None,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Config(err)
    }
}

impl From<NetworkError> for RunError {
    fn from(err: NetworkError) -> Self {
        RunError::Network(err)
    }
}

impl From<ShapeError> for RunError {
    fn from(err: ShapeError) -> Self {
        RunError::Shape(err)
    }
}

impl From<TraceError> for RunError {
    fn from(err: TraceError) -> Self {
        RunError::Trace(err)
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub network: Network,
    pub trace: ActivationTrace,
    pub document: TraceDocument,
    pub persisted: Result<(), TraceError>,
}

/// Network, trace and document of one forward pass that has not been persisted.
#[derive(Debug)]
pub struct ForwardRun {
    pub network: Network,
    pub trace: ActivationTrace,
    pub document: TraceDocument,
}

/// Builds a network from `config` and feeds it `input`, which must have one
/// finite value per first-layer unit. Fails with `TraceError::NonFinite` when
/// the parameters or activations cannot be written as JSON.
pub fn compute_forward(config: &NetworkConfig, input: &[f64]) -> Result<ForwardRun, RunError> {
    let sizes = config.layer_sizes()?;
    if input.len() != sizes[0] {
        return Err(RunError::InputLength {
            expected: sizes[0],
            actual: input.len(),
        });
    }
    if let Some((index, &value)) = input.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(RunError::NonFiniteInput { index, value });
    }

    let network = Network::from_config(config)?;
    let trace = network.forward(input)?;
    let document = TraceDocument::from_trace(&network, &trace)?;
    Ok(ForwardRun {
        network,
        trace,
        document,
    })
}

/// [`compute_forward`] followed by writing the trace to `destination`.
pub fn run_forward(
    config: &NetworkConfig,
    input: &[f64],
    destination: impl AsRef<Path>,
) -> Result<RunOutcome, RunError> {
    let ForwardRun {
        network,
        trace,
        document,
    } = compute_forward(config, input)?;
    let persisted = write_document(&document, destination);
    Ok(RunOutcome {
        network,
        trace,
        document,
        persisted,
    })
}

/// Standard-normal network with `layer_sizes`, run on `input`; returns the
/// trace document as pretty-printed JSON without touching the filesystem.
pub fn forward_trace_json(
    layer_sizes: Vec<i64>,
    input: &[f64],
    seed: Option<u64>,
) -> Result<String, RunError> {
    let config = NetworkConfig {
        layer_sizes,
        seed,
        ..NetworkConfig::default()
    };
    let run = compute_forward(&config, input)?;
    Ok(run.document.to_json_pretty()?)
}

#[derive(Clone, Debug)]
pub struct ReplayReport {
    pub recorded: TraceDocument,
    pub replayed: TraceDocument,
}

impl ReplayReport {
    pub fn matches(&self) -> bool {
        self.recorded == self.replayed
    }

    /// 1-based layers whose recorded input or output differs from the replay.
    pub fn mismatched_layers(&self) -> Vec<usize> {
        self.recorded
            .layers
            .iter()
            .zip(&self.replayed.layers)
            .enumerate()
            .filter(|(_, (a, b))| a.input != b.input || a.output != b.output)
            .map(|(i, _)| i + 1)
            .collect()
    }
}

/// Rebuilds the network stored in a trace file and reruns it on the recorded
/// initial input.
pub fn replay_document(path: impl AsRef<Path>) -> Result<ReplayReport, RunError> {
    let recorded = read_document(path)?;
    let network = Network::from_document(&recorded)?;
    let trace = network.forward(&recorded.initial_input)?;
    let replayed = TraceDocument::from_trace(&network, &trace)?;
    Ok(ReplayReport { recorded, replayed })
}
