use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use classport_core::{
    Backend, BackendModel, ClassifierError, DType, Device, IOName, IoSpec, ModelArtifact,
    ModelOutputs, ModelSpec, OutputValue, Shape, Tensor, ValueKind,
};
use ort::{
    memory::Allocator,
    session::{builder::SessionBuilder, Session, SessionInputValue},
    tensor::TensorElementType,
    value::{DynValue, DynValueTypeMarker, ValueRef, ValueType},
};
use tracing::debug;

pub struct OrtBackend;

impl OrtBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtModel {
    spec: ModelSpec,
    session: Mutex<Session>,
}

impl Backend for OrtBackend {
    type Model = OrtModel;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn load(&self, artifact: &ModelArtifact, device: Device) -> classport_core::Result<Self::Model> {
        let ModelArtifact::OnnxPath(path) = artifact;
        if !path.is_file() {
            return Err(ClassifierError::model_load(path, "model file does not exist"));
        }

        let session = open_session(path, &device)
            .map_err(|err| ClassifierError::model_load(path, err))?;
        let spec = build_model_spec(&session)
            .map_err(|err| ClassifierError::model_load(path, err))?;

        debug!(
            path = %path.display(),
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            "onnx session ready"
        );

        Ok(OrtModel {
            spec,
            session: Mutex::new(session),
        })
    }
}

impl BackendModel for OrtModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> classport_core::Result<ModelOutputs> {
        self.run(inputs).map_err(|err| ClassifierError::Inference(err.into()))
    }
}

impl OrtModel {
    fn run(&self, inputs: Vec<(IOName, Tensor)>) -> Result<ModelOutputs> {
        ensure!(
            inputs.len() == self.spec.inputs.len(),
            "expected {} inputs, got {}",
            self.spec.inputs.len(),
            inputs.len()
        );

        let mut ort_inputs = Vec::with_capacity(inputs.len());
        for (name, input) in inputs {
            ensure!(
                self.spec.inputs.iter().any(|io| io.name == name),
                "model has no input named `{name}`"
            );
            let value = tensor_to_ort_value(input)?;
            ort_inputs.push((name.0, SessionInputValue::from(value)));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("onnx session lock poisoned"))?;
        let outputs = session.run(ort_inputs)?;

        let mut decoded = ModelOutputs::new();
        for (name, value) in outputs.iter() {
            let value = ort_value_to_output(&value)
                .with_context(|| format!("failed to read output `{name}`"))?;
            decoded.insert(IOName(name.to_string()), value);
        }

        Ok(decoded)
    }
}

fn open_session(path: &std::path::Path, device: &Device) -> Result<Session> {
    let builder = Session::builder()
        .context("failed to create ORT session builder")?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .context("failed to configure ORT session builder")?;

    let builder = configure_session_builder(builder, device)?;

    builder
        .commit_from_file(path)
        .context("failed to load ONNX model")
}

fn build_model_spec(session: &Session) -> Result<ModelSpec> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| io_spec_from_value_type(&input.name, &input.input_type))
        .collect::<Result<Vec<_>>>()?;

    let outputs = session
        .outputs
        .iter()
        .map(|output| io_spec_from_value_type(&output.name, &output.output_type))
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelSpec { inputs, outputs })
}

fn configure_session_builder(builder: SessionBuilder, device: &Device) -> Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, *device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but classport-backend-ort was built without the `cuda` feature")
    }
}

fn io_spec_from_value_type(name: &str, value_type: &ValueType) -> Result<IoSpec> {
    let kind = match value_type {
        ValueType::Tensor { ty, shape, .. } => ValueKind::Tensor {
            dtype: ort_tensor_element_to_dtype(*ty)?,
            dims: shape
                .iter()
                .map(|d| if *d < 0 { None } else { Some(*d as usize) })
                .collect(),
        },
        ValueType::Sequence(inner) => match inner.as_ref() {
            ValueType::Map { key, value } => ValueKind::SequenceOfMaps {
                key: ort_tensor_element_to_dtype(*key)?,
                value: ort_tensor_element_to_dtype(*value)?,
            },
            other => ValueKind::Other(format!("sequence of {other:?}")),
        },
        other => ValueKind::Other(format!("{other:?}")),
    };

    Ok(IoSpec {
        name: IOName(name.to_string()),
        kind,
    })
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> Result<DType> {
    match ty {
        TensorElementType::Float32 => Ok(DType::F32),
        TensorElementType::Float16 => Ok(DType::F16),
        TensorElementType::Float64 => Ok(DType::F64),
        TensorElementType::Int64 => Ok(DType::I64),
        TensorElementType::Int32 => Ok(DType::I32),
        TensorElementType::Uint8 => Ok(DType::U8),
        TensorElementType::String => Ok(DType::String),
        _ => bail!("unsupported tensor element type: {ty}"),
    }
}

fn tensor_to_ort_value(tensor: Tensor) -> Result<DynValue> {
    let shape: Vec<usize> = tensor.shape.dims().to_vec();

    let value = match tensor.dtype {
        DType::F32 => {
            let data = tensor.to_f32_vec()?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::I64 => {
            let data = tensor.to_i64_vec()?;
            ort::value::Tensor::from_array((shape, data))?.into_dyn()
        }
        DType::U8 => {
            ensure!(
                tensor.data.len() == tensor.numel(),
                "input byte size mismatch: got {}, expected {}",
                tensor.data.len(),
                tensor.numel()
            );
            ort::value::Tensor::from_array((shape, tensor.data.to_vec()))?.into_dyn()
        }
        other => bail!("{other} inputs are not supported"),
    };

    Ok(value)
}

fn ort_value_to_output(value: &ValueRef<'_>) -> Result<OutputValue> {
    match value.dtype() {
        ValueType::Tensor {
            ty: TensorElementType::String,
            shape,
            ..
        } => {
            let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
            let (_, values) = value.try_extract_strings()?;
            Ok(OutputValue::Strings {
                shape: Shape::from_slice(&dims),
                values,
            })
        }
        ValueType::Tensor { .. } => ort_value_to_tensor(value).map(OutputValue::Tensor),
        ValueType::Sequence(inner) if matches!(inner.as_ref(), ValueType::Map { .. }) => {
            ort_value_to_map_sequence(value).map(OutputValue::MapSequence)
        }
        other => bail!("unsupported output value type: {other:?}"),
    }
}

fn ort_value_to_map_sequence(value: &ValueRef<'_>) -> Result<Vec<BTreeMap<String, f32>>> {
    let allocator = Allocator::default();
    let maps = value.try_extract_sequence::<DynValueTypeMarker>(&allocator)?;

    let mut out = Vec::with_capacity(maps.len());
    for map in maps {
        let ValueType::Map { key, value: value_ty } = map.dtype() else {
            bail!("sequence element is not a map");
        };
        let entries: BTreeMap<String, f32> = match (key, value_ty) {
            (TensorElementType::String, TensorElementType::Float32) => map
                .try_extract_map::<String, f32>()?
                .into_iter()
                .collect(),
            (TensorElementType::Int64, TensorElementType::Float32) => map
                .try_extract_map::<i64, f32>()?
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            (k, v) => bail!("unsupported map element types: {k} -> {v}"),
        };
        out.push(entries);
    }

    Ok(out)
}

fn ort_value_to_tensor(value: &ValueRef<'_>) -> Result<Tensor> {
    let ValueType::Tensor { ty, shape, .. } = value.dtype() else {
        bail!("non-tensor outputs are not supported");
    };

    let dims: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
    let shape = Shape::from_slice(&dims);

    match *ty {
        TensorElementType::Float32 => {
            let array = value.try_extract_array::<f32>()?;
            let data = array.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
            Ok(Tensor::from_cpu_bytes(DType::F32, shape, Bytes::from(data)))
        }
        TensorElementType::Float64 => {
            let array = value.try_extract_array::<f64>()?;
            let data = array.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
            Ok(Tensor::from_cpu_bytes(DType::F64, shape, Bytes::from(data)))
        }
        TensorElementType::Int64 => {
            let array = value.try_extract_array::<i64>()?;
            let data = array.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
            Ok(Tensor::from_cpu_bytes(DType::I64, shape, Bytes::from(data)))
        }
        TensorElementType::Int32 => {
            let array = value.try_extract_array::<i32>()?;
            let data = array.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>();
            Ok(Tensor::from_cpu_bytes(DType::I32, shape, Bytes::from(data)))
        }
        TensorElementType::Uint8 => {
            let array = value.try_extract_array::<u8>()?;
            Ok(Tensor::from_cpu_bytes(
                DType::U8,
                shape,
                Bytes::from(array.iter().copied().collect::<Vec<_>>()),
            ))
        }
        _ => bail!("unsupported output tensor element type: {ty}"),
    }
}
