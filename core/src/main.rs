//! CLI entry point for mlbridge.

use anyhow::{bail, Context, Result};
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mlbridge::cli::{Cli, Commands};
use mlbridge::config::Config;
use mlbridge::engine::ModelDescription;
use mlbridge::tensor::TensorArray;
use mlbridge::{
    ArtifactCache, BatchModelHandle, ComputeBackend, DType, Element, InterpEngine, ModelHandle,
    PredictRequest, ResultView, F16,
};

/// One named input in the JSON input file.
#[derive(Debug, Deserialize)]
struct InputTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    dtype: DType,
}

fn default_dtype() -> DType {
    DType::F32
}

type InputSet = BTreeMap<String, InputTensor>;

fn to_array<T: Element>(input: &InputTensor) -> Result<ArrayD<T>> {
    let data = input.data.iter().copied().map(T::from_f32).collect();
    ArrayD::from_shape_vec(IxDyn(&input.shape), data).context("Failed to create input tensor")
}

fn bind_single(request: &mut PredictRequest<'_>, inputs: &InputSet) -> Result<()> {
    for (name, input) in inputs {
        match input.dtype {
            DType::F32 => request.bind_array(name, to_array::<f32>(input)?)?,
            DType::F16 => request.bind_array(name, to_array::<F16>(input)?)?,
            DType::I32 => request.bind_array(name, to_array::<i32>(input)?)?,
            DType::U16 => request.bind_array(name, to_array::<u16>(input)?)?,
        }
    }
    Ok(())
}

fn bind_batch(model: &mut BatchModelHandle<InterpEngine>, inputs: &InputSet, index: usize) -> Result<()> {
    for (name, input) in inputs {
        match input.dtype {
            DType::F32 => model.bind_array(name, to_array::<f32>(input)?, index)?,
            DType::F16 => model.bind_array(name, to_array::<F16>(input)?, index)?,
            DType::I32 => model.bind_array(name, to_array::<i32>(input)?, index)?,
            DType::U16 => model.bind_array(name, to_array::<u16>(input)?, index)?,
        }
    }
    Ok(())
}

/// Zeroed caller-side buffer for every declared output.
fn backing_storage(description: &ModelDescription) -> Vec<(String, TensorArray)> {
    description
        .outputs
        .iter()
        .filter_map(|output| {
            let shape = IxDyn(output.shape()?);
            let array = match output.dtype()? {
                DType::F32 => TensorArray::F32(ArrayD::default(shape)),
                DType::F16 => TensorArray::F16(ArrayD::default(shape)),
                DType::I32 => TensorArray::I32(ArrayD::default(shape)),
                DType::U16 => TensorArray::U16(ArrayD::default(shape)),
            };
            Some((output.name.clone(), array))
        })
        .collect()
}

fn bind_backings<'b>(request: &mut PredictRequest<'b>, storage: &'b mut [(String, TensorArray)]) -> Result<()> {
    for (name, array) in storage.iter_mut() {
        let shape = array.shape().to_vec();
        let missing = || format!("Backing for `{}` is not contiguous", name);
        match array {
            TensorArray::F32(a) => request.bind_output_backing(name, &shape, a.as_slice_mut().with_context(missing)?)?,
            TensorArray::F16(a) => request.bind_output_backing(name, &shape, a.as_slice_mut().with_context(missing)?)?,
            TensorArray::I32(a) => request.bind_output_backing(name, &shape, a.as_slice_mut().with_context(missing)?)?,
            TensorArray::U16(a) => request.bind_output_backing(name, &shape, a.as_slice_mut().with_context(missing)?)?,
        }
    }
    Ok(())
}

fn output_json(view: &ResultView<'_>) -> Result<Value> {
    let mut outputs = serde_json::Map::new();
    for name in view.output_names() {
        let dtype = view.dtype(name).context("Output vanished")?;
        let data: Vec<f32> = match dtype {
            DType::F32 => view.output_vec::<f32>(name)?,
            DType::F16 => view.output_vec::<F16>(name)?.into_iter().map(F16::to_f32).collect(),
            DType::I32 => view.output_vec::<i32>(name)?.into_iter().map(|v| v as f32).collect(),
            DType::U16 => view.output_vec::<u16>(name)?.into_iter().map(f32::from).collect(),
        };
        outputs.insert(
            name.to_string(),
            serde_json::json!({
                "dtype": dtype,
                "shape": view.shape(name),
                "data": data,
            }),
        );
    }
    Ok(Value::Object(outputs))
}

fn print_value(value: &Value, format: &str) -> Result<()> {
    if format == "pretty" {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

/// Resolve the artifact to load, going through the cache when configured.
fn resolve_model(config: &Config, model: Option<PathBuf>, compiled: bool) -> Result<(PathBuf, bool)> {
    let path = model
        .or_else(|| config.model.path.clone())
        .context("No model given; pass --model or set model.path in the config")?;
    let compiled = compiled || config.model.compiled;
    if compiled {
        return Ok((path, true));
    }
    let Some(cache_dir) = &config.model.cache_dir else {
        return Ok((path, false));
    };
    let cache = ArtifactCache::new(cache_dir);
    if let Some(artifact) = cache.get(&config.model.cache_name)? {
        info!("Using cached artifact: {}", artifact.display());
        return Ok((artifact, true));
    }
    let artifact = cache.compile_into(&InterpEngine::new(), &path, &config.model.cache_name)?;
    Ok((artifact, true))
}

fn load_config(config: Option<&Path>) -> Result<Config> {
    match config {
        Some(path) => Config::from_yaml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Infer {
            model,
            input,
            backend,
            format,
            config,
            compiled,
            backing,
        } => {
            let config = load_config(config.as_deref())?;
            let backend: ComputeBackend = match backend {
                Some(b) => b.parse()?,
                None => config.model.compute_backend,
            };
            let format = format.unwrap_or_else(|| config.inference.format.clone());
            let (model_path, compiled) = resolve_model(&config, model, compiled)?;
            info!("Using backend: {}", backend);

            info!("Loading input: {}", input.display());
            let input_json: Value = serde_json::from_str(
                &fs::read_to_string(&input)
                    .with_context(|| format!("Failed to read input: {}", input.display()))?,
            )?;

            let output = match input_json {
                Value::Array(items) => {
                    if backing {
                        bail!("--backing is not supported for batch input");
                    }
                    let items: Vec<InputSet> = items
                        .into_iter()
                        .map(serde_json::from_value)
                        .collect::<std::result::Result<_, _>>()
                        .context("Batch input must be an array of input objects")?;

                    info!("Loading model: {}", model_path.display());
                    let mut model = BatchModelHandle::from_path(InterpEngine::new(), &model_path, compiled, backend);
                    model.load()?;

                    let mut results = Vec::with_capacity(items.len());
                    for chunk in items.chunks(config.inference.batch_size) {
                        for (index, inputs) in chunk.iter().enumerate() {
                            bind_batch(&mut model, inputs, index)?;
                        }
                        let batch = model.predict()?;
                        for view in batch.iter() {
                            results.push(output_json(view)?);
                        }
                    }
                    info!("Batch inference complete: {} items", results.len());
                    serde_json::json!({ "count": results.len(), "outputs": results })
                }
                other => {
                    let inputs: InputSet = serde_json::from_value(other)
                        .context("Input must map names to { data, shape } objects")?;

                    info!("Loading model: {}", model_path.display());
                    let mut model = ModelHandle::from_path(InterpEngine::new(), &model_path, compiled, backend);
                    model.load()?;
                    info!("Model loaded successfully");

                    let description = model.describe().context("Model is not loaded")?;
                    let mut storage = if backing {
                        backing_storage(&description)
                    } else {
                        Vec::new()
                    };
                    let mut request = PredictRequest::new();
                    bind_single(&mut request, &inputs)?;
                    bind_backings(&mut request, &mut storage)?;

                    info!("Running inference...");
                    let result = model.run(request)?;
                    info!(
                        "Inference complete: {} outputs ({:?})",
                        result.len(),
                        result.mode()
                    );
                    serde_json::json!({
                        "num_outputs": result.len(),
                        "zero_copy": result.is_zero_copy(),
                        "outputs": output_json(&result)?,
                    })
                }
            };

            print_value(&output, &format)?;
        }

        Commands::Info {
            model,
            backend,
            compiled,
        } => {
            let backend: ComputeBackend = backend.parse()?;

            println!("mlbridge v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Model: {}", model.display());
            println!("Backend: {}", backend);

            info!("Loading model...");
            let mut handle = ModelHandle::from_path(InterpEngine::new(), &model, compiled, backend);
            handle.load()?;
            let description = handle.describe().context("Model is not loaded")?;
            println!("Status: OK (model loaded successfully)");
            println!("Inputs:");
            for input in &description.inputs {
                println!("  {}", input);
            }
            println!("Outputs:");
            for output in &description.outputs {
                println!("  {}", output);
            }
        }

        Commands::Compile {
            model,
            out_dir,
            name,
        } => {
            let cache = ArtifactCache::new(&out_dir);
            let artifact = cache
                .compile_into(&InterpEngine::new(), &model, &name)
                .with_context(|| format!("Failed to compile: {}", model.display()))?;
            println!("{}", artifact.display());
        }
    }

    Ok(())
}
