//! Prediction results handed back to the caller.

use ndarray::{ArrayViewD, IxDyn};
use std::collections::BTreeMap;

use crate::engine::EngineOutputs;
use crate::error::{BridgeError, Result};
use crate::features::OutputBackings;
use crate::tensor::{DType, Element, TensorArray, TensorSlice, F16};

/// How a result's data is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialization {
    /// Caller-safe copies made when the view was built.
    Detached,
    /// Backed outputs alias the caller's own backing buffers.
    ZeroCopy,
}

/// One output inside a [`ResultView`].
#[derive(Debug, Clone)]
enum OutputValue<'b> {
    Detached(TensorArray),
    Backed {
        shape: Vec<usize>,
        data: TensorSlice<'b>,
    },
}

impl<'b> OutputValue<'b> {
    fn dtype(&self) -> DType {
        match self {
            Self::Detached(array) => array.dtype(),
            Self::Backed { data, .. } => data.dtype(),
        }
    }

    fn shape(&self) -> &[usize] {
        match self {
            Self::Detached(array) => array.shape(),
            Self::Backed { shape, .. } => shape,
        }
    }

    fn detach(self) -> Result<OutputValue<'static>> {
        match self {
            Self::Detached(array) => Ok(OutputValue::Detached(array)),
            Self::Backed { shape, data } => Ok(OutputValue::Detached(data.to_array(&shape)?)),
        }
    }
}

/// Outputs of one prediction.
///
/// A detached view owns copies of everything and may outlive the handle and
/// any later prediction. A zero-copy view borrows the caller's backing
/// buffers for `'b`.
#[derive(Debug, Clone)]
pub struct ResultView<'b> {
    outputs: BTreeMap<String, OutputValue<'b>>,
    mode: Materialization,
}

impl ResultView<'static> {
    /// Copy every engine output into caller-owned memory.
    pub(crate) fn detached(outputs: EngineOutputs<'_>) -> Result<Self> {
        Ok(Self {
            outputs: copy_outputs(outputs)?,
            mode: Materialization::Detached,
        })
    }
}

impl<'b> ResultView<'b> {
    /// Alias the backing buffers; copy whatever the engine returned itself.
    pub(crate) fn backed(backings: OutputBackings<'b>, outputs: EngineOutputs<'_>) -> Result<Self> {
        let mut values = copy_outputs(outputs)?;
        for (name, backing) in backings {
            let (shape, data) = backing.into_parts();
            values.insert(
                name,
                OutputValue::Backed {
                    shape,
                    data: data.into_shared(),
                },
            );
        }
        Ok(Self {
            outputs: values,
            mode: Materialization::ZeroCopy,
        })
    }

    pub fn mode(&self) -> Materialization {
        self.mode
    }

    pub fn is_zero_copy(&self) -> bool {
        self.mode == Materialization::ZeroCopy
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Output names in sorted order.
    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.keys().map(String::as_str).collect()
    }

    /// One `"name: dtype[shape]"` line per output.
    pub fn output_description(&self) -> Vec<String> {
        self.outputs
            .iter()
            .map(|(name, value)| format!("{}: {}{:?}", name, value.dtype(), value.shape()))
            .collect()
    }

    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.outputs.get(name).map(OutputValue::dtype)
    }

    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.outputs.get(name).map(OutputValue::shape)
    }

    /// Typed array view of an output.
    ///
    /// Fails if `name` is absent or holds a different element type. In
    /// zero-copy mode a backed output is a view over the caller's buffer.
    pub fn output<T: Element>(&self, name: &str) -> Result<ArrayViewD<'_, T>> {
        let value = self
            .outputs
            .get(name)
            .ok_or_else(|| BridgeError::MissingOutput(name.to_string()))?;
        let mismatch = || BridgeError::TypeMismatch {
            name: name.to_string(),
            requested: T::DTYPE,
            actual: value.dtype(),
        };
        match value {
            OutputValue::Detached(array) => T::array_view(array).ok_or_else(mismatch),
            OutputValue::Backed { shape, data } => {
                let slice = T::unwrap_slice(*data).ok_or_else(mismatch)?;
                ArrayViewD::from_shape(IxDyn(shape), slice)
                    .map_err(|e| BridgeError::tensor(format!("Array shape error: {}", e)))
            }
        }
    }

    /// Row-major copy of an output, owned by the caller.
    pub fn output_vec<T: Element>(&self, name: &str) -> Result<Vec<T>> {
        Ok(self.output::<T>(name)?.iter().copied().collect())
    }

    pub fn output_f32(&self, name: &str) -> Result<Vec<f32>> {
        self.output_vec(name)
    }

    pub fn output_f16(&self, name: &str) -> Result<Vec<F16>> {
        self.output_vec(name)
    }

    pub fn output_i32(&self, name: &str) -> Result<Vec<i32>> {
        self.output_vec(name)
    }

    pub fn output_u16(&self, name: &str) -> Result<Vec<u16>> {
        self.output_vec(name)
    }

    /// Copy any backed outputs so the view no longer borrows the caller.
    pub fn into_detached(self) -> Result<ResultView<'static>> {
        let outputs = self
            .outputs
            .into_iter()
            .map(|(name, value)| Ok((name, value.detach()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(ResultView {
            outputs,
            mode: Materialization::Detached,
        })
    }
}

fn copy_outputs(outputs: EngineOutputs<'_>) -> Result<BTreeMap<String, OutputValue<'static>>> {
    outputs
        .into_iter()
        .map(|(name, tensor)| {
            let array = tensor.data.to_array(tensor.shape)?;
            Ok((name, OutputValue::Detached(array)))
        })
        .collect()
}

/// Outputs of a batch prediction, one detached view per item.
#[derive(Debug, Clone, Default)]
pub struct BatchResultView {
    outputs: Vec<ResultView<'static>>,
}

impl BatchResultView {
    pub(crate) fn from_engine(outputs: Vec<EngineOutputs<'_>>) -> Result<Self> {
        let outputs = outputs
            .into_iter()
            .map(ResultView::detached)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { outputs })
    }

    pub fn count(&self) -> usize {
        self.outputs.len()
    }

    /// Detached view of batch item `index`.
    pub fn output_at(&self, index: usize) -> Result<&ResultView<'static>> {
        self.outputs.get(index).ok_or(BridgeError::IndexOutOfRange {
            index,
            count: self.outputs.len(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultView<'static>> {
        self.outputs.iter()
    }

    pub fn into_outputs(self) -> Vec<ResultView<'static>> {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TensorRef;
    use crate::tensor::BackingTensor;

    #[test]
    fn test_detached_view_copies() {
        let shape = [1usize, 2];
        let scratch = vec![1.5f32, 2.5];
        let mut outputs = EngineOutputs::new();
        outputs.insert(
            "y".to_string(),
            TensorRef {
                shape: &shape,
                data: f32::wrap_slice(&scratch),
            },
        );
        let view = ResultView::detached(outputs).unwrap();
        drop(scratch);

        assert_eq!(view.mode(), Materialization::Detached);
        assert_eq!(view.output_f32("y").unwrap(), vec![1.5, 2.5]);
        assert_eq!(view.output::<f32>("y").unwrap().shape(), &[1, 2]);
        assert_eq!(view.output_description(), vec!["y: f32[1, 2]".to_string()]);
    }

    #[test]
    fn test_output_errors() {
        let view = ResultView::detached(EngineOutputs::new()).unwrap();
        assert!(matches!(
            view.output_f32("y"),
            Err(BridgeError::MissingOutput(_))
        ));

        let shape = [2usize];
        let data = [1i32, 2];
        let mut outputs = EngineOutputs::new();
        outputs.insert(
            "ids".to_string(),
            TensorRef {
                shape: &shape,
                data: i32::wrap_slice(&data),
            },
        );
        let view = ResultView::detached(outputs).unwrap();
        assert!(matches!(
            view.output_f32("ids"),
            Err(BridgeError::TypeMismatch {
                requested: DType::F32,
                actual: DType::I32,
                ..
            })
        ));
        assert_eq!(view.output_i32("ids").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_backed_view_aliases_caller_buffer() {
        let mut slots = [7u16, 8];
        let ptr = slots.as_ptr();
        let mut backings = OutputBackings::new();
        backings.insert("y", BackingTensor::bridge(&[2], &mut slots).unwrap());
        let view = ResultView::backed(backings, EngineOutputs::new()).unwrap();

        assert!(view.is_zero_copy());
        let out = view.output::<u16>("y").unwrap();
        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(view.output_u16("y").unwrap(), vec![7, 8]);

        let detached = view.into_detached().unwrap();
        assert_eq!(detached.mode(), Materialization::Detached);
        assert_ne!(detached.output::<u16>("y").unwrap().as_ptr(), ptr);
        slots[0] = 0;
        assert_eq!(detached.output_u16("y").unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_batch_out_of_range() {
        let batch = BatchResultView::from_engine(vec![EngineOutputs::new()]).unwrap();
        assert_eq!(batch.count(), 1);
        assert!(batch.output_at(0).is_ok());
        assert!(matches!(
            batch.output_at(1),
            Err(BridgeError::IndexOutOfRange { index: 1, count: 1 })
        ));
    }
}
