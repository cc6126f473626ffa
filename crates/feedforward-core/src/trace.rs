use crate::network::{Network, NetworkError};
use crate::nn::{Layer, Unit};
use serde::de::{self, DeserializeOwned};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::{error::Error, fmt};
use tempfile::NamedTempFile;

/// Every vector seen during one forward pass: the external input first, then
/// one output vector per layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivationTrace {
    outputs: Vec<Vec<f64>>,
}

impl ActivationTrace {
    pub(crate) fn new(outputs: Vec<Vec<f64>>) -> Self {
        debug_assert!(!outputs.is_empty(), "trace always holds the input");
        Self { outputs }
    }

    pub fn initial_input(&self) -> &[f64] {
        &self.outputs[0]
    }

    pub fn final_output(&self) -> &[f64] {
        &self.outputs[self.outputs.len() - 1]
    }

    /// Input of 1-based layer `n`, or `None` for `n == 0` or past the last layer.
    pub fn layer_input(&self, n: usize) -> Option<&[f64]> {
        if n >= self.outputs.len() {
            return None;
        }
        n.checked_sub(1)
            .and_then(|i| self.outputs.get(i))
            .map(Vec::as_slice)
    }

    /// Output of 1-based layer `n`, or `None` for `n == 0` or past the last layer.
    pub fn layer_output(&self, n: usize) -> Option<&[f64]> {
        if n == 0 {
            return None;
        }
        self.outputs.get(n).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn as_slice(&self) -> &[Vec<f64>] {
        &self.outputs
    }

    pub fn into_inner(self) -> Vec<Vec<f64>> {
        self.outputs
    }
}

#[derive(Debug)]
pub enum TraceError {
    Io(io::Error),
    Json(serde_json::Error),
    LengthMismatch { layers: usize, trace_len: usize },
    /// JSON has no encoding for NaN or infinities.
    NonFinite { key: String, index: usize },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(e) => write!(f, "trace I/O failed: {e}"),
            TraceError::Json(e) => write!(f, "trace document is not valid: {e}"),
            TraceError::LengthMismatch { layers, trace_len } => write!(
                f,
                "trace has {trace_len} vectors but the network has {layers} layers (expected {})",
                layers + 1
            ),
            TraceError::NonFinite { key, index } => {
                write!(f, "`{key}`[{index}] is not a finite number")
            }
        }
    }
}

impl Error for TraceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TraceError::Io(e) => Some(e),
            TraceError::Json(e) => Some(e),
            TraceError::LengthMismatch { .. } | TraceError::NonFinite { .. } => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        TraceError::Io(err)
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(err: serde_json::Error) -> Self {
        TraceError::Json(err)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayerRecord {
    pub input: Vec<f64>,
    pub output: Vec<f64>,
    pub neurons: Vec<Unit>,
}

/// Persisted form of one forward pass.
///
/// Serializes to a flat JSON object: `initial_input`, then `layer_<n>_input`,
/// `layer_<n>_output` and `layer_<n>_neurons` for each 1-based layer `n`, then
/// `final_output`. Each neuron is `{ "weights": [...], "bias": x }`.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceDocument {
    pub initial_input: Vec<f64>,
    pub layers: Vec<LayerRecord>,
    pub final_output: Vec<f64>,
}

impl TraceDocument {
    pub fn from_trace(network: &Network, trace: &ActivationTrace) -> Result<Self, TraceError> {
        if trace.len() != network.len() + 1 {
            return Err(TraceError::LengthMismatch {
                layers: network.len(),
                trace_len: trace.len(),
            });
        }
        let layers = network
            .layers()
            .iter()
            .enumerate()
            .map(|(i, layer)| LayerRecord {
                input: trace.as_slice()[i].clone(),
                output: trace.as_slice()[i + 1].clone(),
                neurons: layer.units().to_vec(),
            })
            .collect();
        let doc = Self {
            initial_input: trace.initial_input().to_vec(),
            layers,
            final_output: trace.final_output().to_vec(),
        };
        doc.check_finite()?;
        Ok(doc)
    }

    /// Fails on the first NaN or infinite value, naming its JSON key. Neuron
    /// values report the unit index.
    pub fn check_finite(&self) -> Result<(), TraceError> {
        fn scan(key: impl Fn() -> String, values: &[f64]) -> Result<(), TraceError> {
            match values.iter().position(|v| !v.is_finite()) {
                Some(index) => Err(TraceError::NonFinite { key: key(), index }),
                None => Ok(()),
            }
        }

        scan(|| "initial_input".to_string(), &self.initial_input)?;
        for (i, layer) in self.layers.iter().enumerate() {
            let n = i + 1;
            scan(|| format!("layer_{n}_input"), &layer.input)?;
            scan(|| format!("layer_{n}_output"), &layer.output)?;
            for (unit, neuron) in layer.neurons.iter().enumerate() {
                let finite =
                    neuron.bias().is_finite() && neuron.weights().iter().all(|w| w.is_finite());
                if !finite {
                    return Err(TraceError::NonFinite {
                        key: format!("layer_{n}_neurons"),
                        index: unit,
                    });
                }
            }
        }
        scan(|| "final_output".to_string(), &self.final_output)
    }

    pub fn to_json_pretty(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Serialize for TraceDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + 3 * self.layers.len()))?;
        map.serialize_entry("initial_input", &self.initial_input)?;
        for (i, layer) in self.layers.iter().enumerate() {
            let n = i + 1;
            map.serialize_entry(&format!("layer_{n}_input"), &layer.input)?;
            map.serialize_entry(&format!("layer_{n}_output"), &layer.output)?;
            map.serialize_entry(&format!("layer_{n}_neurons"), &layer.neurons)?;
        }
        map.serialize_entry("final_output", &self.final_output)?;
        map.end()
    }
}

fn take_field<T: DeserializeOwned, E: de::Error>(
    map: &mut Map<String, Value>,
    key: &str,
) -> Result<T, E> {
    let value = map
        .remove(key)
        .ok_or_else(|| E::custom(format!("missing field `{key}`")))?;
    serde_json::from_value(value).map_err(|e| E::custom(format!("field `{key}`: {e}")))
}

impl<'de> Deserialize<'de> for TraceDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::<String, Value>::deserialize(deserializer)?;
        let initial_input = take_field::<_, D::Error>(&mut map, "initial_input")?;
        let final_output = take_field::<_, D::Error>(&mut map, "final_output")?;

        let mut layers = Vec::new();
        for n in 1.. {
            let input_key = format!("layer_{n}_input");
            if !map.contains_key(&input_key) {
                break;
            }
            let output_key = format!("layer_{n}_output");
            let neurons_key = format!("layer_{n}_neurons");
            layers.push(LayerRecord {
                input: take_field::<_, D::Error>(&mut map, &input_key)?,
                output: take_field::<_, D::Error>(&mut map, &output_key)?,
                neurons: take_field::<_, D::Error>(&mut map, &neurons_key)?,
            });
        }

        if let Some(key) = map.keys().next() {
            return Err(de::Error::custom(format!("unexpected field `{key}`")));
        }
        Ok(Self {
            initial_input,
            layers,
            final_output,
        })
    }
}

impl Network {
    /// Rebuilds the network whose parameters a document recorded. Layer 0
    /// takes no inputs; layer `n` takes the previous layer's unit count.
    pub fn from_document(doc: &TraceDocument) -> Result<Self, NetworkError> {
        let mut layers = Vec::with_capacity(doc.layers.len());
        let mut num_inputs = 0;
        for (i, record) in doc.layers.iter().enumerate() {
            let layer = Layer::from_units(num_inputs, record.neurons.clone()).map_err(
                |(unit, shape)| {
                    if i == 0 {
                        NetworkError::FirstLayerHasInputs {
                            num_inputs: shape.actual,
                        }
                    } else {
                        NetworkError::UnitWidthMismatch {
                            layer: i,
                            unit,
                            expected: shape.expected,
                            actual: shape.actual,
                        }
                    }
                },
            )?;
            num_inputs = layer.len();
            layers.push(layer);
        }
        Self::from_layers(layers)
    }
}

fn write_atomically(doc: &TraceDocument, path: &Path) -> Result<(), TraceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, doc)?;
        writer.flush()?;
    }
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| TraceError::Io(e.error))?;
    Ok(())
}

/// Writes `doc` to `path`, replacing any existing file.
///
/// The document goes to a uniquely named temporary file in the destination
/// directory and is renamed into place, so `path` never holds a partially
/// written document. The temporary file is removed if any step fails.
pub fn write_document(doc: &TraceDocument, path: impl AsRef<Path>) -> Result<(), TraceError> {
    let path = path.as_ref();
    let result = doc.check_finite().and_then(|()| write_atomically(doc, path));
    match &result {
        Ok(()) => {
            tracing::info!(path = %path.display(), layers = doc.layers.len(), "wrote trace document");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to write trace document");
        }
    }
    result
}

pub fn read_document(path: impl AsRef<Path>) -> Result<TraceDocument, TraceError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ConstantInit, GaussianInit};

    fn sample() -> (Network, ActivationTrace) {
        let mut init = GaussianInit::from_seed(11, 0.0, 1.0).unwrap();
        let net = Network::try_new(&[4, 3, 2], &mut init).unwrap();
        let trace = net.forward(&[0.1, 0.4, 0.2, 0.3]).unwrap();
        (net, trace)
    }

    #[test]
    fn trace_accessors_are_one_based() {
        let (_, trace) = sample();
        assert_eq!(trace.len(), 4);
        assert_eq!(trace.initial_input(), &[0.1, 0.4, 0.2, 0.3]);
        assert_eq!(trace.layer_input(1).unwrap(), trace.initial_input());
        assert_eq!(trace.layer_input(2).unwrap(), trace.layer_output(1).unwrap());
        assert_eq!(trace.final_output(), trace.layer_output(3).unwrap());
    }

    #[test]
    fn document_mirrors_network_and_trace() {
        let (net, trace) = sample();
        let doc = TraceDocument::from_trace(&net, &trace).unwrap();
        assert_eq!(doc.layers.len(), 3);
        assert_eq!(doc.initial_input, trace.initial_input());
        assert_eq!(doc.final_output, trace.final_output());
        for (i, record) in doc.layers.iter().enumerate() {
            assert_eq!(record.input, trace.as_slice()[i]);
            assert_eq!(record.output, trace.as_slice()[i + 1]);
            assert_eq!(record.neurons, net.layers()[i].units());
        }
    }

    #[test]
    fn json_keys_follow_layer_order() {
        let mut init = ConstantInit {
            weight: 0.5,
            bias: 0.0,
        };
        let net = Network::try_new(&[1, 1], &mut init).unwrap();
        let trace = net.forward(&[0.1]).unwrap();
        let json = TraceDocument::from_trace(&net, &trace)
            .unwrap()
            .to_json_pretty()
            .unwrap();

        let keys = [
            "\"initial_input\"",
            "\"layer_1_input\"",
            "\"layer_1_output\"",
            "\"layer_1_neurons\"",
            "\"layer_2_input\"",
            "\"layer_2_output\"",
            "\"layer_2_neurons\"",
            "\"final_output\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["layer_2_neurons"][0]["weights"], serde_json::json!([0.5]));
        assert_eq!(value["layer_2_neurons"][0]["bias"], serde_json::json!(0.0));
        assert_eq!(value["layer_1_neurons"][0]["weights"], serde_json::json!([]));
    }

    #[test]
    fn document_round_trips_through_json() {
        let (net, trace) = sample();
        let doc = TraceDocument::from_trace(&net, &trace).unwrap();
        let json = doc.to_json_pretty().unwrap();
        let back: TraceDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        let missing = r#"{ "initial_input": [0.1] }"#;
        assert!(serde_json::from_str::<TraceDocument>(missing).is_err());

        let unknown = r#"{ "initial_input": [], "final_output": [], "extra": 1 }"#;
        let err = serde_json::from_str::<TraceDocument>(unknown).unwrap_err();
        assert!(err.to_string().contains("extra"));

        let partial_layer =
            r#"{ "initial_input": [], "layer_1_input": [], "final_output": [] }"#;
        assert!(serde_json::from_str::<TraceDocument>(partial_layer).is_err());
    }

    #[test]
    fn mismatched_trace_is_rejected() {
        let (net, _) = sample();
        let short = ActivationTrace::new(vec![vec![0.0]]);
        assert!(matches!(
            TraceDocument::from_trace(&net, &short),
            Err(TraceError::LengthMismatch {
                layers: 3,
                trace_len: 1
            })
        ));
    }

    #[test]
    fn network_rebuilds_from_document() {
        let (net, trace) = sample();
        let doc = TraceDocument::from_trace(&net, &trace).unwrap();
        let rebuilt = Network::from_document(&doc).unwrap();
        assert_eq!(rebuilt, net);
        assert_eq!(rebuilt.forward(&doc.initial_input).unwrap(), trace);
    }

    #[test]
    fn rebuild_rejects_weighted_first_layer() {
        let (net, trace) = sample();
        let mut doc = TraceDocument::from_trace(&net, &trace).unwrap();
        doc.layers[0].neurons[0] = Unit::from_parts(vec![1.0], 0.0);
        assert_eq!(
            Network::from_document(&doc),
            Err(NetworkError::FirstLayerHasInputs { num_inputs: 1 })
        );
    }

    #[test]
    fn write_to_missing_directory_reports_io_error() {
        let (net, trace) = sample();
        let doc = TraceDocument::from_trace(&net, &trace).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("trace.json");
        assert!(matches!(write_document(&doc, &path), Err(TraceError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn write_leaves_unrelated_siblings_alone() {
        let (net, trace) = sample();
        let doc = TraceDocument::from_trace(&net, &trace).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        let sibling = dir.path().join(".trace.json.tmp");
        std::fs::write(&sibling, "keep me").unwrap();

        write_document(&doc, &path).unwrap();
        write_document(&doc, &path).unwrap();

        assert_eq!(std::fs::read_to_string(&sibling).unwrap(), "keep me");
        assert_eq!(read_document(&path).unwrap(), doc);
        let mut names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        names.sort();
        assert_eq!(names, vec![".trace.json.tmp", "trace.json"]);
    }

    #[test]
    fn layer_accessors_reject_out_of_range() {
        let (_, trace) = sample();
        assert_eq!(trace.layer_input(0), None);
        assert_eq!(trace.layer_output(0), None);
        assert_eq!(trace.layer_input(4), None);
        assert_eq!(trace.layer_output(4), None);
        assert_eq!(trace.layer_output(usize::MAX), None);
        assert!(trace.layer_input(3).is_some());
    }

    #[test]
    fn nan_input_is_rejected_before_serializing() {
        let net = Network::try_new(&[1, 1], &mut ConstantInit { weight: 0.5, bias: 0.0 }).unwrap();
        let trace = net.forward(&[f64::NAN]).unwrap();
        match TraceDocument::from_trace(&net, &trace) {
            Err(TraceError::NonFinite { key, index }) => {
                assert_eq!(key, "initial_input");
                assert_eq!(index, 0);
            }
            other => panic!("expected NonFinite, got {other:?}"),
        }
    }

    #[test]
    fn infinite_parameter_is_not_written() {
        let (net, trace) = sample();
        let mut doc = TraceDocument::from_trace(&net, &trace).unwrap();
        doc.layers[1].neurons[2] = Unit::from_parts(vec![1.0, f64::INFINITY, 0.0, 0.0], 0.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");

        match write_document(&doc, &path) {
            Err(TraceError::NonFinite { key, index }) => {
                assert_eq!(key, "layer_2_neurons");
                assert_eq!(index, 2);
            }
            other => panic!("expected NonFinite, got {other:?}"),
        }
        assert!(!path.exists());
    }
}
