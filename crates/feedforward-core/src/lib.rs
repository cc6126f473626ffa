//! Randomly initialized fully-connected sigmoid networks and a JSON dump of
//! everything one forward pass touches.

pub mod config;
pub mod network;
pub mod nn;
pub mod params;
pub mod progress;
pub mod run;
pub mod trace;

pub use config::{ConfigError, NetworkConfig};
pub use network::{Network, NetworkError};
pub use nn::{sigmoid, Layer, ShapeError, Unit};
pub use params::{ConstantInit, GaussianInit, ParamSource};
pub use progress::{PacedWriter, ProgressSink};
pub use run::{
    compute_forward, forward_trace_json, replay_document, run_forward, ForwardRun, RunError,
    RunOutcome,
};
pub use trace::{read_document, write_document, ActivationTrace, TraceDocument, TraceError};
