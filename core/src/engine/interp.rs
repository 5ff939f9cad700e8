//! Portable CPU interpreter engine.
//!
//! Runs small dataflow graphs described in YAML. `compile` validates a graph,
//! resolves every output shape and writes a JSON artifact; loading reads that
//! artifact back. Outputs are computed in `f32` and converted to the declared
//! dtype. Output memory not covered by a backing lives in per-model scratch
//! buffers that are reused by the next prediction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{
    ComputeBackend, EngineOutputs, FeatureDescription, FeatureKind, InferenceEngine,
    ModelDescription, NativeModel, TensorRef,
};
use crate::error::{BridgeError, Result};
use crate::features::{FeatureDictionary, FeatureValue, OutputBackings, PixelBuffer};
use crate::tensor::{DType, Element, ReleaseBuffer, TensorSlice, F16};

/// Tag written into every compiled artifact.
pub const ARTIFACT_FORMAT: &str = "mlbridge-interp";
pub const ARTIFACT_VERSION: u32 = 1;

/// Operation producing one output from one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Op {
    Identity { input: String },
    Scale { input: String, factor: f32 },
    Sum { input: String, axis: usize },
    Mean { input: String, axis: usize },
    Argmax { input: String, axis: usize },
}

impl Op {
    pub fn input(&self) -> &str {
        match self {
            Self::Identity { input }
            | Self::Scale { input, .. }
            | Self::Sum { input, .. }
            | Self::Mean { input, .. }
            | Self::Argmax { input, .. } => input,
        }
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match self {
            Self::Identity { .. } | Self::Scale { .. } => Ok(input_shape.to_vec()),
            Self::Sum { axis, .. } | Self::Mean { axis, .. } | Self::Argmax { axis, .. } => {
                if *axis >= input_shape.len() {
                    return Err(BridgeError::model_load(format!(
                        "axis {} out of range for input `{}` of rank {}",
                        axis,
                        self.input(),
                        input_shape.len()
                    )));
                }
                let mut shape = input_shape.to_vec();
                shape.remove(*axis);
                if shape.is_empty() {
                    shape.push(1);
                }
                Ok(shape)
            }
        }
    }

    fn apply(&self, shape: &[usize], values: &[f32]) -> Vec<f32> {
        match self {
            Self::Identity { .. } => values.to_vec(),
            Self::Scale { factor, .. } => values.iter().map(|v| v * factor).collect(),
            Self::Sum { axis, .. } => reduce(shape, values, *axis, |lane| lane.iter().sum()),
            Self::Mean { axis, .. } => reduce(shape, values, *axis, |lane| {
                lane.iter().sum::<f32>() / lane.len() as f32
            }),
            Self::Argmax { axis, .. } => reduce(shape, values, *axis, |lane| {
                lane.iter()
                    .enumerate()
                    .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 {
                            (i, v)
                        } else {
                            best
                        }
                    })
                    .0 as f32
            }),
        }
    }
}

/// Collapse `axis` by applying `fold` to every lane along it.
fn reduce(shape: &[usize], values: &[f32], axis: usize, fold: impl Fn(&[f32]) -> f32) -> Vec<f32> {
    let outer: usize = shape[..axis].iter().product();
    let n = shape[axis];
    let inner: usize = shape[axis + 1..].iter().product();
    let mut lane = Vec::with_capacity(n);
    let mut out = Vec::with_capacity(outer * inner);
    for o in 0..outer {
        for i in 0..inner {
            lane.clear();
            lane.extend((0..n).map(|k| values[(o * n + k) * inner + i]));
            out.push(fold(&lane));
        }
    }
    out
}

/// An output declaration in a graph source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub dtype: DType,
    pub op: Op,
}

/// Uncompiled graph source, as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub inputs: Vec<FeatureDescription>,
    pub outputs: Vec<OutputSpec>,
}

impl GraphSpec {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the graph and resolve every output shape.
    pub fn compile(self) -> Result<CompiledGraph> {
        check_unique(self.inputs.iter().map(|i| i.name.as_str()), "input")?;
        check_unique(self.outputs.iter().map(|o| o.name.as_str()), "output")?;
        for input in &self.inputs {
            check_input(input)?;
        }
        let outputs = self
            .outputs
            .into_iter()
            .map(|o| {
                let shape = resolve_output(&self.inputs, &o.op)?;
                Ok(CompiledOutput {
                    name: o.name,
                    dtype: o.dtype,
                    shape,
                    op: o.op,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CompiledGraph {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            name: self.name,
            inputs: self.inputs,
            outputs,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledOutput {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub op: Op,
}

/// Compiled artifact: a validated graph with resolved output shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledGraph {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub inputs: Vec<FeatureDescription>,
    pub outputs: Vec<CompiledOutput>,
}

impl CompiledGraph {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let graph: CompiledGraph = serde_json::from_slice(bytes)
            .map_err(|e| BridgeError::model_load(format!("malformed compiled model: {}", e)))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Re-check an artifact that came from outside this process.
    pub fn validate(&self) -> Result<()> {
        if self.format != ARTIFACT_FORMAT || self.version != ARTIFACT_VERSION {
            return Err(BridgeError::model_load(format!(
                "unsupported artifact {} v{}",
                self.format, self.version
            )));
        }
        check_unique(self.inputs.iter().map(|i| i.name.as_str()), "input")?;
        check_unique(self.outputs.iter().map(|o| o.name.as_str()), "output")?;
        for input in &self.inputs {
            check_input(input)?;
        }
        for output in &self.outputs {
            let shape = resolve_output(&self.inputs, &output.op)?;
            if shape != output.shape {
                return Err(BridgeError::model_load(format!(
                    "output `{}` declares shape {:?}, graph produces {:?}",
                    output.name, output.shape, shape
                )));
            }
        }
        Ok(())
    }

    pub fn describe(&self) -> ModelDescription {
        ModelDescription {
            inputs: self.inputs.clone(),
            outputs: self
                .outputs
                .iter()
                .map(|o| FeatureDescription::tensor(o.name.clone(), o.dtype, o.shape.clone()))
                .collect(),
        }
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(BridgeError::model_load(format!(
                "duplicate {} name `{}`",
                what, name
            )));
        }
    }
    Ok(())
}

fn check_input(input: &FeatureDescription) -> Result<()> {
    let degenerate = match &input.kind {
        FeatureKind::Tensor { shape, .. } => shape.is_empty() || shape.contains(&0),
        FeatureKind::Image { width, height } => *width == 0 || *height == 0,
    };
    if degenerate {
        return Err(BridgeError::model_load(format!(
            "input `{}` has an empty shape",
            input.name
        )));
    }
    Ok(())
}

/// Shape an input presents to ops; images read as `[height, width, 4]`.
fn input_shape(input: &FeatureDescription) -> Vec<usize> {
    match &input.kind {
        FeatureKind::Tensor { shape, .. } => shape.clone(),
        FeatureKind::Image { width, height } => vec![*height, *width, PixelBuffer::CHANNELS],
    }
}

fn resolve_output(inputs: &[FeatureDescription], op: &Op) -> Result<Vec<usize>> {
    let input = inputs
        .iter()
        .find(|i| i.name == op.input())
        .ok_or_else(|| BridgeError::model_load(format!("op reads unknown input `{}`", op.input())))?;
    op.output_shape(&input_shape(input))
}

/// Typed scratch storage for one output.
#[derive(Debug)]
enum ScratchData {
    F32(Vec<f32>),
    F16(Vec<F16>),
    I32(Vec<i32>),
    U16(Vec<u16>),
}

impl ScratchData {
    fn empty(dtype: DType) -> Self {
        match dtype {
            DType::F32 => Self::F32(Vec::new()),
            DType::F16 => Self::F16(Vec::new()),
            DType::I32 => Self::I32(Vec::new()),
            DType::U16 => Self::U16(Vec::new()),
        }
    }

    fn dtype(&self) -> DType {
        self.as_slice().dtype()
    }

    /// Refill in place, keeping the allocation.
    fn store(&mut self, values: &[f32]) {
        each_dtype!(self, ScratchData, v => {
            v.clear();
            for x in values {
                v.push(Element::from_f32(*x));
            }
        })
    }

    fn as_slice(&self) -> TensorSlice<'_> {
        each_dtype!(self, ScratchData, v => Element::wrap_slice(v.as_slice()))
    }
}

#[derive(Debug)]
struct Scratch {
    shape: Vec<usize>,
    data: ScratchData,
}

impl Scratch {
    fn as_ref(&self) -> TensorRef<'_> {
        TensorRef {
            shape: &self.shape,
            data: self.data.as_slice(),
        }
    }
}

type ScratchSet = BTreeMap<String, Scratch>;

fn store_scratch(set: &mut ScratchSet, output: &CompiledOutput, values: &[f32]) {
    let slot = set.entry(output.name.clone()).or_insert_with(|| Scratch {
        shape: output.shape.clone(),
        data: ScratchData::empty(output.dtype),
    });
    if slot.data.dtype() != output.dtype {
        slot.data = ScratchData::empty(output.dtype);
    }
    slot.data.store(values);
}

/// Read and check every declared input; returns `f32` values by name.
fn read_inputs(
    graph: &CompiledGraph,
    inputs: &FeatureDictionary,
) -> Result<BTreeMap<String, Vec<f32>>> {
    if let Some(unknown) = inputs.names().find(|n| !graph.inputs.iter().any(|i| i.name == *n)) {
        return Err(BridgeError::inference(format!(
            "model has no input named `{}`",
            unknown
        )));
    }
    let mut values = BTreeMap::new();
    for decl in &graph.inputs {
        let value = inputs.get(&decl.name).ok_or_else(|| {
            BridgeError::inference(format!("missing input `{}`", decl.name))
        })?;
        let data = match (&decl.kind, value) {
            (FeatureKind::Tensor { dtype, shape }, FeatureValue::Tensor(tensor)) => {
                if tensor.dtype() != *dtype || tensor.shape() != shape.as_slice() {
                    return Err(BridgeError::inference(format!(
                        "input `{}` expects {} {:?}, got {} {:?}",
                        decl.name,
                        dtype,
                        shape,
                        tensor.dtype(),
                        tensor.shape()
                    )));
                }
                tensor.data().to_f32_vec()
            }
            (FeatureKind::Image { width, height }, FeatureValue::PixelBuffer(image)) => {
                if image.width() != *width || image.height() != *height {
                    return Err(BridgeError::inference(format!(
                        "input `{}` expects a {}x{} image, got {}x{}",
                        decl.name,
                        width,
                        height,
                        image.width(),
                        image.height()
                    )));
                }
                image.as_bytes().iter().map(|&b| f32::from(b)).collect()
            }
            _ => {
                return Err(BridgeError::inference(format!(
                    "input `{}` has the wrong feature kind",
                    decl.name
                )))
            }
        };
        values.insert(decl.name.clone(), data);
    }
    Ok(values)
}

fn evaluate(
    graph: &CompiledGraph,
    output: &CompiledOutput,
    values: &BTreeMap<String, Vec<f32>>,
) -> Vec<f32> {
    let name = output.op.input();
    let shape = graph
        .inputs
        .iter()
        .find(|i| i.name == name)
        .map(input_shape)
        .unwrap_or_default();
    let data = values.get(name).map(Vec::as_slice).unwrap_or(&[]);
    output.op.apply(&shape, data)
}

/// A materialized interpreter model.
#[derive(Debug)]
pub struct InterpModel {
    graph: Arc<CompiledGraph>,
    backend: ComputeBackend,
    scratch: ScratchSet,
    batch_scratch: Vec<ScratchSet>,
}

impl InterpModel {
    pub fn new(graph: Arc<CompiledGraph>, backend: ComputeBackend) -> Self {
        Self {
            graph,
            backend,
            scratch: ScratchSet::new(),
            batch_scratch: Vec::new(),
        }
    }

    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }
}

impl NativeModel for InterpModel {
    fn describe(&self) -> ModelDescription {
        self.graph.describe()
    }

    fn predict(
        &mut self,
        inputs: FeatureDictionary,
        backings: &mut OutputBackings<'_>,
    ) -> Result<EngineOutputs<'_>> {
        let graph = Arc::clone(&self.graph);
        for name in backings.names() {
            if !graph.outputs.iter().any(|o| o.name == name) {
                return Err(BridgeError::inference(format!(
                    "output backing `{}` does not name a model output",
                    name
                )));
            }
        }
        // Every backing must fit before any caller buffer is written.
        for output in &graph.outputs {
            if let Some(backing) = backings.get(&output.name) {
                if backing.dtype() != output.dtype || backing.shape() != output.shape.as_slice() {
                    return Err(BridgeError::inference(format!(
                        "output backing `{}` is {} {:?}, model produces {} {:?}",
                        output.name,
                        backing.dtype(),
                        backing.shape(),
                        output.dtype,
                        output.shape
                    )));
                }
            }
        }

        let values = read_inputs(&graph, &inputs)?;
        // The input buffers are no longer referenced past this point.
        drop(inputs);

        for output in &graph.outputs {
            let result = evaluate(&graph, output, &values);
            match backings.get_mut(&output.name) {
                Some(backing) => backing.data_mut().fill_from_f32(&result)?,
                None => store_scratch(&mut self.scratch, output, &result),
            }
        }

        let scratch = &self.scratch;
        Ok(graph
            .outputs
            .iter()
            .filter(|o| !backings.contains(&o.name))
            .filter_map(|o| scratch.get_key_value(&o.name))
            .map(|(name, slot)| (name.clone(), slot.as_ref()))
            .collect())
    }

    fn predict_batch(&mut self, batch: Vec<FeatureDictionary>) -> Result<Vec<EngineOutputs<'_>>> {
        let graph = Arc::clone(&self.graph);
        self.batch_scratch.resize_with(batch.len(), ScratchSet::new);
        for (index, (inputs, set)) in batch.into_iter().zip(&mut self.batch_scratch).enumerate() {
            let values = read_inputs(&graph, &inputs)
                .map_err(|e| BridgeError::inference(format!("batch item {}: {}", index, e)))?;
            drop(inputs);
            for output in &graph.outputs {
                let result = evaluate(&graph, output, &values);
                store_scratch(set, output, &result);
            }
        }
        debug!(items = self.batch_scratch.len(), "interp batch complete");
        Ok(self
            .batch_scratch
            .iter()
            .map(|set| {
                set.iter()
                    .map(|(name, slot)| (name.clone(), slot.as_ref()))
                    .collect()
            })
            .collect())
    }
}

/// Engine running compiled graphs on the host CPU.
///
/// Every compute backend maps to the host CPU; the selection is kept on the
/// model for reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpEngine;

impl InterpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl InferenceEngine for InterpEngine {
    type Asset = Arc<CompiledGraph>;
    type Model = InterpModel;

    fn name(&self) -> &'static str {
        "interp"
    }

    fn compile(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(BridgeError::FileNotFound(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path)?;
        let compiled = GraphSpec::from_yaml_str(&source)?.compile()?;

        let mut file = tempfile::Builder::new()
            .prefix("mlbridge-")
            .suffix(".mlc.json")
            .tempfile()?;
        serde_json::to_writer_pretty(&mut file, &compiled)?;
        file.flush()?;
        let (_, compiled_path) = file.keep().map_err(|e| BridgeError::Io(e.error))?;
        debug!(source = %path.display(), compiled = %compiled_path.display(), "compiled graph");
        Ok(compiled_path)
    }

    fn parse_asset(&self, bytes: ReleaseBuffer<u8>) -> Result<Self::Asset> {
        let graph = CompiledGraph::from_json_slice(bytes.as_slice())?;
        Ok(Arc::new(graph))
    }

    fn load_asset(&self, asset: &Self::Asset, backend: ComputeBackend) -> Result<Self::Model> {
        debug!(%backend, "materializing interp model from asset");
        Ok(InterpModel::new(Arc::clone(asset), backend))
    }

    fn load_path(&self, path: &Path, backend: ComputeBackend) -> Result<Self::Model> {
        if !path.exists() {
            return Err(BridgeError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let graph = CompiledGraph::from_json_slice(&bytes)?;
        debug!(path = %path.display(), %backend, "materializing interp model from path");
        Ok(InterpModel::new(Arc::new(graph), backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{BackingTensor, StridedTensor};

    const SUM_GRAPH: &str = r#"
name: row-sum
inputs:
  - name: x
    kind: tensor
    dtype: f32
    shape: [1, 3, 2]
outputs:
  - name: y
    dtype: f32
    op: { kind: sum, input: x, axis: 1 }
  - name: best
    dtype: i32
    op: { kind: argmax, input: x, axis: 1 }
"#;

    fn sum_model() -> InterpModel {
        let graph = GraphSpec::from_yaml_str(SUM_GRAPH).unwrap().compile().unwrap();
        InterpModel::new(Arc::new(graph), ComputeBackend::Cpu)
    }

    fn input(values: Vec<f32>) -> FeatureDictionary {
        let mut dict = FeatureDictionary::new();
        dict.insert(
            "x",
            StridedTensor::bridge(&[1, 3, 2], ReleaseBuffer::from_vec(values)).unwrap(),
        );
        dict
    }

    #[test]
    fn test_compile_resolves_shapes() {
        let graph = GraphSpec::from_yaml_str(SUM_GRAPH).unwrap().compile().unwrap();
        let desc = graph.describe();
        assert_eq!(desc.output_shape("y"), Some(&[1, 2][..]));
        assert_eq!(desc.output_type("best"), Some(DType::I32));
        graph.validate().unwrap();
    }

    #[test]
    fn test_compile_rejects_bad_graphs() {
        let bad_axis = SUM_GRAPH.replace("axis: 1 }\n  - name: best", "axis: 3 }\n  - name: best");
        assert!(GraphSpec::from_yaml_str(&bad_axis).unwrap().compile().is_err());

        let unknown_input = SUM_GRAPH.replace("input: x, axis: 1 }\n  - name: best", "input: z, axis: 1 }\n  - name: best");
        assert!(GraphSpec::from_yaml_str(&unknown_input).unwrap().compile().is_err());

        let duplicate = SUM_GRAPH.replace("name: best", "name: y");
        assert!(GraphSpec::from_yaml_str(&duplicate).unwrap().compile().is_err());
    }

    #[test]
    fn test_predict_sum_and_argmax() {
        let mut model = sum_model();
        let outputs = model
            .predict(input(vec![1.0, 2.0, 3.0, 4.0, 5.0, -6.0]), &mut OutputBackings::new())
            .unwrap();
        let y = outputs["y"];
        assert_eq!(y.shape, &[1, 2]);
        assert_eq!(i32::unwrap_slice(outputs["best"].data), Some(&[2, 1][..]));
        assert_eq!(f32::unwrap_slice(y.data), Some(&[9.0f32, 0.0][..]));
    }

    #[test]
    fn test_predict_writes_backing_and_omits_it() {
        let mut model = sum_model();
        let mut slots = [0.0f32; 2];
        let mut backings = OutputBackings::new();
        backings.insert("y", BackingTensor::bridge(&[1, 2], &mut slots).unwrap());
        let names: Vec<String> = model
            .predict(input(vec![1.0; 6]), &mut backings)
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(names, vec!["best".to_string()]);
        drop(backings);
        assert_eq!(slots, [3.0, 3.0]);
    }

    #[test]
    fn test_predict_rejects_mismatched_backing() {
        let mut model = sum_model();
        let mut slots = [0i32; 2];
        let mut backings = OutputBackings::new();
        backings.insert("y", BackingTensor::bridge(&[1, 2], &mut slots).unwrap());
        assert!(model.predict(input(vec![1.0; 6]), &mut backings).is_err());

        let mut other = [0.0f32; 2];
        let mut backings = OutputBackings::new();
        backings.insert("nope", BackingTensor::bridge(&[2], &mut other).unwrap());
        assert!(model.predict(input(vec![1.0; 6]), &mut backings).is_err());
    }

    #[test]
    fn test_mismatched_backing_leaves_other_backings_untouched() {
        let mut model = sum_model();
        let mut y = [-1.0f32; 2];
        let mut best = [7i32; 2];
        let mut backings = OutputBackings::new();
        backings.insert("y", BackingTensor::bridge(&[1, 2], &mut y).unwrap());
        backings.insert("best", BackingTensor::bridge(&[2], &mut best).unwrap());
        assert!(model.predict(input(vec![1.0; 6]), &mut backings).is_err());
        drop(backings);
        assert_eq!(y, [-1.0, -1.0]);
        assert_eq!(best, [7, 7]);
    }

    #[test]
    fn test_predict_checks_inputs() {
        let mut model = sum_model();
        assert!(model
            .predict(FeatureDictionary::new(), &mut OutputBackings::new())
            .is_err());

        let mut dict = FeatureDictionary::new();
        dict.insert(
            "x",
            StridedTensor::bridge(&[6], ReleaseBuffer::from_vec(vec![0.0f32; 6])).unwrap(),
        );
        assert!(model.predict(dict, &mut OutputBackings::new()).is_err());
    }

    #[test]
    fn test_image_inputs_read_as_hwc() {
        let yaml = r#"
inputs:
  - name: image
    kind: image
    width: 2
    height: 1
outputs:
  - name: channel_mean
    dtype: f16
    op: { kind: mean, input: image, axis: 1 }
"#;
        let graph = GraphSpec::from_yaml_str(yaml).unwrap().compile().unwrap();
        let mut model = InterpModel::new(Arc::new(graph), ComputeBackend::CpuAndGpu);
        let image = PixelBuffer::bgra(
            2,
            1,
            ReleaseBuffer::from_vec(vec![10, 20, 30, 255, 30, 40, 50, 255]),
        )
        .unwrap();
        let mut dict = FeatureDictionary::new();
        dict.insert("image", image);
        let outputs = model.predict(dict, &mut OutputBackings::new()).unwrap();
        let mean = outputs["channel_mean"];
        assert_eq!(mean.shape, &[1, 4]);
        assert_eq!(mean.data.to_f32_vec(), vec![20.0, 30.0, 40.0, 255.0]);
    }

    #[test]
    fn test_predict_batch_keeps_items_apart() {
        let mut model = sum_model();
        let outputs = model
            .predict_batch(vec![input(vec![1.0; 6]), input(vec![2.0; 6])])
            .unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0]["y"].data.to_f32_vec(), vec![3.0, 3.0]);
        assert_eq!(outputs[1]["y"].data.to_f32_vec(), vec![6.0, 6.0]);
    }

    #[test]
    fn test_parse_asset_rejects_garbage() {
        let engine = InterpEngine::new();
        assert!(engine
            .parse_asset(ReleaseBuffer::from_vec(b"not a model".to_vec()))
            .is_err());

        let graph = GraphSpec::from_yaml_str(SUM_GRAPH).unwrap().compile().unwrap();
        let mut tampered = graph.clone();
        tampered.outputs[0].shape = vec![3];
        let bytes = serde_json::to_vec(&tampered).unwrap();
        assert!(engine.parse_asset(ReleaseBuffer::from_vec(bytes)).is_err());

        let bytes = serde_json::to_vec(&graph).unwrap();
        let asset = engine.parse_asset(ReleaseBuffer::from_vec(bytes)).unwrap();
        let model = engine.load_asset(&asset, ComputeBackend::Cpu).unwrap();
        assert_eq!(model.backend(), ComputeBackend::Cpu);
    }
}
