use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Minimal PyO3 module exposing feedforward-core to Python.
#[pyfunction]
fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Build a standard-normal network with `layer_sizes`, run `input` through it
/// and return the trace document as pretty-printed JSON.
///
/// Negative sizes, an input whose length differs from the first layer, and
/// non-finite values all raise `ValueError`.
#[pyfunction]
#[pyo3(signature = (layer_sizes, input, seed=None))]
fn forward_trace_json(
    layer_sizes: Vec<i64>,
    input: Vec<f64>,
    seed: Option<u64>,
) -> PyResult<String> {
    feedforward_core::forward_trace_json(layer_sizes, &input, seed)
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(version, m)?)?;
    m.add_function(wrap_pyfunction!(forward_trace_json, m)?)?;
    Ok(())
}
