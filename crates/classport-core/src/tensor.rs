use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

use crate::{ClassifierError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    F64,
    I64,
    I32,
    U8,
    String,
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::F64 => "f64",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
            DType::String => "string",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }
    /// Leading (batch) dimension, 1 for scalars.
    pub fn leading(&self) -> usize {
        self.0.first().copied().unwrap_or(1)
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0.as_slice())
    }
}

/// Dense CPU tensor with little-endian element bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, data: Bytes) -> Self {
        Self { dtype, shape, data }
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self> {
        ensure_len(&shape, values.len())?;
        let mut buf = BytesMut::with_capacity(values.len() * 4);
        for v in values {
            buf.put_f32_le(*v);
        }
        Ok(Self::from_cpu_bytes(DType::F32, shape, buf.freeze()))
    }

    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self> {
        ensure_len(&shape, values.len())?;
        let mut buf = BytesMut::with_capacity(values.len() * 8);
        for v in values {
            buf.put_i64_le(*v);
        }
        Ok(Self::from_cpu_bytes(DType::I64, shape, buf.freeze()))
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match self.dtype {
            DType::F32 => Ok(self
                .checked_chunks(4)?
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()),
            DType::F64 => Ok(self
                .checked_chunks(8)?
                .map(|b| {
                    f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                })
                .collect()),
            other => Err(ClassifierError::Inference(
                format!("cannot read {other} tensor as f32").into(),
            )),
        }
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        match self.dtype {
            DType::I64 => Ok(self
                .checked_chunks(8)?
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect()),
            DType::I32 => Ok(self
                .checked_chunks(4)?
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
                .collect()),
            other => Err(ClassifierError::Inference(
                format!("cannot read {other} tensor as i64").into(),
            )),
        }
    }

    fn checked_chunks(&self, width: usize) -> Result<std::slice::ChunksExact<'_, u8>> {
        let expected = self.numel() * width;
        if self.data.len() != expected {
            return Err(ClassifierError::Inference(
                format!(
                    "tensor byte size mismatch: got {}, expected {expected}",
                    self.data.len()
                )
                .into(),
            ));
        }
        Ok(self.data.chunks_exact(width))
    }
}

fn ensure_len(shape: &Shape, len: usize) -> Result<()> {
    if shape.numel() != len {
        return Err(ClassifierError::Inference(
            format!("shape {shape} holds {} elements, got {len}", shape.numel()).into(),
        ));
    }
    Ok(())
}
