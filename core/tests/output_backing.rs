use anyhow::Result;
use approx::assert_abs_diff_eq;
use mlbridge::{
    BackingTensor, BridgeError, ComputeBackend, InterpEngine, Materialization, ModelHandle,
    PredictRequest, ReleaseBuffer,
};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures").join(name)
}

fn row_sum_model() -> Result<ModelHandle<InterpEngine>> {
    let mut model = ModelHandle::from_path(InterpEngine::new(), fixture("row_sum.yaml"), false, ComputeBackend::Cpu);
    model.load()?;
    Ok(model)
}

#[test]
fn backing_receives_outputs_in_place() -> Result<()> {
    let mut model = row_sum_model()?;
    let mut y = vec![0.0f32; 2];
    let y_ptr = y.as_ptr();

    let mut request = PredictRequest::new();
    request.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]))?;
    request.bind_output_backing("y", &[1, 2], &mut y)?;

    let result = model.run(request)?;
    assert_eq!(result.mode(), Materialization::ZeroCopy);

    let view = result.output::<f32>("y")?;
    assert_eq!(view.as_ptr(), y_ptr, "backed output aliases the caller buffer");
    assert_abs_diff_eq!(view[[0, 0]], 9.0, epsilon = 1e-6);
    assert_abs_diff_eq!(view[[0, 1]], 12.0, epsilon = 1e-6);

    // Outputs without a backing are still returned, as copies.
    assert_eq!(result.output_i32("best")?, vec![2, 2]);
    drop(result);

    assert_eq!(y, vec![9.0, 12.0]);
    Ok(())
}

#[test]
fn staged_backing_through_handle() -> Result<()> {
    let mut model = row_sum_model()?;
    let mut best = vec![-1i32; 2];

    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![6.0f32, 5.0, 4.0, 3.0, 2.0, 1.0]))?;
    // SAFETY: `best` outlives the prediction and is not touched until the
    // result is dropped.
    let backing = unsafe { BackingTensor::from_raw(&[1, 2], best.as_mut_ptr(), best.len())? };
    model.bind_output_backing("best", backing)?;

    let result = model.predict()?;
    assert!(result.is_zero_copy());
    assert_eq!(result.output_i32("best")?, vec![0, 0]);
    assert_eq!(result.output_f32("y")?, vec![12.0, 9.0]);
    drop(result);
    assert_eq!(best, vec![0, 0]);

    // Backings do not carry over to the next prediction.
    model.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![0.0f32; 6]))?;
    assert!(!model.predict()?.is_zero_copy());
    Ok(())
}

#[test]
fn backing_shape_mismatch_is_rejected() -> Result<()> {
    let mut model = row_sum_model()?;
    let mut y = vec![0.0f32; 2];

    let mut request = PredictRequest::new();
    request.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]))?;
    request.bind_output_backing("y", &[2, 1], &mut y)?;

    let err = model.run(request).unwrap_err();
    assert!(matches!(err, BridgeError::Inference(_)));
    Ok(())
}

#[test]
fn backing_for_unknown_output_is_rejected() -> Result<()> {
    let mut model = row_sum_model()?;
    let mut z = vec![0.0f32; 2];

    let mut request = PredictRequest::new();
    request.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]))?;
    request.bind_output_backing("z", &[1, 2], &mut z)?;

    let err = model.run(request).unwrap_err();
    assert!(err.to_string().contains("`z`"));
    Ok(())
}

#[test]
fn backing_length_must_match_shape() {
    let mut short = vec![0.0f32; 3];
    let mut request = PredictRequest::new();
    assert!(matches!(
        request.bind_output_backing("y", &[1, 2, 2], &mut short),
        Err(BridgeError::Bind(_))
    ));
    assert!(request.is_empty());
}

#[test]
fn zero_copy_view_detaches() -> Result<()> {
    let mut model = row_sum_model()?;
    let mut y = vec![0.0f32; 2];

    let mut request = PredictRequest::new();
    request.bind_input("x", &[1, 3, 2], ReleaseBuffer::from_vec(vec![1.0f32; 6]))?;
    request.bind_output_backing("y", &[1, 2], &mut y)?;
    let detached = model.run(request)?.into_detached()?;

    y[0] = -1.0;
    assert_eq!(detached.mode(), Materialization::Detached);
    assert_eq!(detached.output_f32("y")?, vec![3.0, 3.0]);
    Ok(())
}
