use anyhow::Result;
use approx::assert_abs_diff_eq;
use mlbridge::{BatchModelHandle, BridgeError, ComputeBackend, InterpEngine, ModelState, ReleaseBuffer};
use ndarray::{ArrayD, IxDyn};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures").join(name)
}

fn batch_model() -> Result<BatchModelHandle<InterpEngine>> {
    let mut model = BatchModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    model.load()?;
    assert_eq!(model.state(), ModelState::Loaded);
    Ok(model)
}

#[test]
fn batch_returns_one_result_per_item() -> Result<()> {
    let mut model = batch_model()?;
    for index in 0..3 {
        let values = vec![index as f32 + 1.0; 6];
        model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(values), index)?;
    }
    assert_eq!(model.pending(), 3);

    let batch = model.predict()?;
    assert_eq!(batch.count(), 3);
    assert_eq!(model.pending(), 0);

    for (index, view) in batch.iter().enumerate() {
        let y = view.output_f32("y")?;
        let expected = 3.0 * (index as f32 + 1.0);
        for v in y {
            assert_abs_diff_eq!(v, expected, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn batch_index_out_of_range() -> Result<()> {
    let mut model = batch_model()?;
    model.bind_array("x", ArrayD::from_elem(IxDyn(&[1, 3, 2]), 1.0f32), 0)?;
    let batch = model.predict()?;

    assert!(batch.output_at(0).is_ok());
    assert!(matches!(
        batch.output_at(1),
        Err(BridgeError::IndexOutOfRange { index: 1, count: 1 })
    ));
    Ok(())
}

#[test]
fn sparse_batch_fails_and_clears() -> Result<()> {
    let mut model = batch_model()?;
    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]), 1)?;
    assert_eq!(model.pending(), 2);

    let err = model.predict().unwrap_err();
    assert!(err.to_string().contains("batch item 0"), "unexpected error: {}", err);
    assert_eq!(model.pending(), 0);
    Ok(())
}

#[test]
fn batch_results_are_detached() -> Result<()> {
    let mut model = batch_model()?;
    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]), 0)?;
    let first = model.predict()?;

    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![5.0f32; 6]), 0)?;
    let second = model.predict()?;

    assert_eq!(first.output_at(0)?.output_f32("y")?, vec![3.0, 3.0]);
    assert_eq!(second.output_at(0)?.output_f32("y")?, vec![15.0, 15.0]);
    Ok(())
}

#[test]
fn batch_predict_before_load_fails() {
    let mut model = BatchModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    assert!(matches!(model.predict(), Err(BridgeError::NotLoaded)));
}
