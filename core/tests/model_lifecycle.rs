use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use mlbridge::{
    BridgeError, ComputeBackend, DType, InferenceEngine, InterpEngine, ModelHandle, ModelState,
    PixelBuffer, ReleaseBuffer, F16,
};
use std::path::PathBuf;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures").join(name)
}

/// Buffer whose release bumps `count`.
fn counted<T: Send + 'static>(data: Vec<T>, count: Arc<AtomicUsize>) -> ReleaseBuffer<T> {
    let mut data = std::mem::ManuallyDrop::new(data.into_boxed_slice());
    let len = data.len();
    let ptr = NonNull::new(data.as_mut_ptr()).expect("boxed slice pointer");
    unsafe {
        ReleaseBuffer::from_parts(ptr, len, move |ptr: NonNull<T>, len| {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)));
            count.fetch_add(1, Ordering::SeqCst);
        })
    }
}

fn row_sum_model() -> Result<ModelHandle<InterpEngine>> {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    assert_eq!(model.state(), ModelState::Unloaded);
    model.load().context("Failed to load row_sum fixture")?;
    Ok(model)
}

#[test]
fn predict_row_sum() -> Result<()> {
    let mut model = row_sum_model()?;
    assert_eq!(model.state(), ModelState::Loaded);
    assert!(model.compiled_path().is_some());

    let released = Arc::new(AtomicUsize::new(0));
    let input = counted(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], Arc::clone(&released));
    model.bind_input("x", &[1, 3, 2], input)?;
    assert_eq!(released.load(Ordering::SeqCst), 0);

    let result = model.predict()?;
    assert_eq!(released.load(Ordering::SeqCst), 1, "input released exactly once");
    assert!(!result.is_zero_copy());
    assert_eq!(result.output_names(), vec!["best", "y"]);

    let y = result.output::<f32>("y")?;
    assert_eq!(y.shape(), &[1, 2]);
    let expected = [9.0, 12.0];
    for (v, exp) in y.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*v, *exp, epsilon = 1e-6);
    }
    assert_eq!(result.output_i32("best")?, vec![2, 2]);
    assert_eq!(result.dtype("best"), Some(DType::I32));
    Ok(())
}

#[test]
fn detached_result_survives_next_prediction() -> Result<()> {
    let mut model = row_sum_model()?;

    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]))?;
    let first = model.predict()?;

    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![10.0f32; 6]))?;
    let second = model.predict()?;

    assert_eq!(first.output_f32("y")?, vec![3.0, 3.0]);
    assert_eq!(second.output_f32("y")?, vec![30.0, 30.0]);
    Ok(())
}

#[test]
fn predict_before_load_fails() -> Result<()> {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![0.0f32; 6]))?;
    assert!(matches!(model.predict(), Err(BridgeError::NotLoaded)));
    assert!(model.describe().is_none());
    Ok(())
}

#[test]
fn unload_and_reload() -> Result<()> {
    let mut model = row_sum_model()?;
    model.unload()?;
    assert_eq!(model.state(), ModelState::Unloaded);
    assert!(matches!(model.predict(), Err(BridgeError::NotLoaded)));

    model.load()?;
    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![2.0f32; 6]))?;
    assert_eq!(model.predict()?.output_f32("y")?, vec![6.0, 6.0]);
    Ok(())
}

#[test]
fn missing_input_clears_staged_state() -> Result<()> {
    let mut model = row_sum_model()?;
    let released = Arc::new(AtomicUsize::new(0));
    model.bind_input("z", &[1, 3, 2], counted(vec![0.0f32; 6], Arc::clone(&released)))?;

    let err = model.predict().unwrap_err();
    assert!(err.to_string().contains("`z`"), "unexpected error: {}", err);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    // The failed request is gone; a fresh bind succeeds.
    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]))?;
    assert_eq!(model.predict()?.output_f32("y")?, vec![3.0, 3.0]);
    Ok(())
}

#[test]
fn rejected_bind_returns_buffer() -> Result<()> {
    let mut model = row_sum_model()?;
    let released = Arc::new(AtomicUsize::new(0));
    let failure = model
        .bind_input("x", &[1, 3, 2], counted(vec![0.0f32; 5], Arc::clone(&released)))
        .unwrap_err();
    let (error, buffer) = failure.into_parts();
    assert!(matches!(error, BridgeError::Bind(_)));
    assert_eq!(buffer.len(), 5);
    assert_eq!(released.load(Ordering::SeqCst), 0);
    drop(buffer);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn corrupt_asset_fails_to_load() -> Result<()> {
    let released = Arc::new(AtomicUsize::new(0));
    let bytes = counted(b"{ not json".to_vec(), Arc::clone(&released));
    let mut model = ModelHandle::from_asset(InterpEngine::new(), bytes, ComputeBackend::Cpu);

    assert_eq!(released.load(Ordering::SeqCst), 1, "asset bytes consumed");
    assert!(model.has_failed_to_load());
    assert!(matches!(model.load(), Err(BridgeError::ModelLoad(_))));
    assert!(matches!(model.predict(), Err(BridgeError::ModelLoad(_))));
    assert_eq!(model.state(), ModelState::FailedToLoad);
    Ok(())
}

#[test]
fn missing_source_fails_to_load() {
    let model = ModelHandle::from_path(InterpEngine::new(), fixture("does_not_exist.yaml"), false, ComputeBackend::Cpu);
    assert!(model.has_failed_to_load());
    assert!(model.compiled_path().is_none());
}

#[test]
fn load_from_compiled_asset() -> Result<()> {
    let compiled = InterpEngine::new().compile(&fixture("row_sum.yaml"))?;
    let bytes = std::fs::read(&compiled)?;
    std::fs::remove_file(&compiled)?;

    let mut model = ModelHandle::from_asset(InterpEngine::new(), ReleaseBuffer::from_vec(bytes), ComputeBackend::CpuAndGpu);
    model.load()?;
    assert_eq!(model.backend(), ComputeBackend::CpuAndGpu);
    let description = model.describe().context("loaded model has a description")?;
    assert_eq!(description.input_shape("x"), Some(&[1, 3, 2][..]));
    assert_eq!(description.output_type("best"), Some(DType::I32));
    Ok(())
}

#[tokio::test]
async fn load_async_materializes_model() -> Result<()> {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    model.load_async().await?;
    assert_eq!(model.state(), ModelState::Loaded);

    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32, 0.0, 0.0, 1.0, 0.0, 0.0]))?;
    assert_eq!(model.predict()?.output_i32("best")?, vec![0, 1]);
    Ok(())
}

#[tokio::test]
#[should_panic]
async fn blocking_load_inside_runtime_panics() {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    let _ = model.load();
}

#[test]
fn half_precision_and_u16_outputs() -> Result<()> {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("half_scale.yaml"), false, ComputeBackend::Cpu);
    model.load()?;

    let input: Vec<F16> = [1.0f32, 2.0, 3.0, 4.0].iter().map(|&v| F16::from_f32(v)).collect();
    model.bind_input("h", &[2, 2], ReleaseBuffer::from_vec(input))?;
    let result = model.predict()?;

    let doubled: Vec<f32> = result.output_f16("doubled")?.into_iter().map(F16::to_f32).collect();
    assert_eq!(doubled, vec![2.0, 4.0, 6.0, 8.0]);
    assert_eq!(result.output_u16("column_total")?, vec![4, 6]);
    Ok(())
}

#[test]
fn bgra_image_input() -> Result<()> {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("image_mean.yaml"), false, ComputeBackend::Cpu);
    model.load()?;

    let pixels = vec![10u8, 20, 30, 40, 30, 40, 50, 60];
    let image = PixelBuffer::bgra(2, 1, ReleaseBuffer::from_vec(pixels)).map_err(|f| f.error)?;
    assert_eq!(image.bytes_per_row(), 8);
    model.bind_pixel_buffer("image", image);

    let result = model.predict()?;
    let mean = result.output_f32("channel_mean")?;
    let expected = [20.0, 30.0, 40.0, 50.0];
    for (v, exp) in mean.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*v, *exp, epsilon = 1e-5);
    }
    Ok(())
}
