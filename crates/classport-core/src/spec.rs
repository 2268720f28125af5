use crate::{ClassifierError, DType, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IOName(pub String);

impl IOName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IOName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IOName {
    fn from(name: &str) -> Self {
        IOName(name.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Tensor {
        dtype: DType,
        dims: Vec<Option<usize>>, // None = dynamic
    },
    /// Sequence of key/value maps, the shape of a ZipMap classifier output.
    SequenceOfMaps { key: DType, value: DType },
    Other(String),
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Tensor { dtype, dims } => {
                let dims = dims
                    .iter()
                    .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "tensor<{dtype}>[{dims}]")
            }
            ValueKind::SequenceOfMaps { key, value } => write!(f, "seq(map<{key}, {value}>)"),
            ValueKind::Other(desc) => f.write_str(desc),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IoSpec {
    pub name: IOName,
    pub kind: ValueKind,
}

/// What a loaded graph declares about its inputs and outputs.
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub inputs: Vec<IoSpec>,
    pub outputs: Vec<IoSpec>,
}

impl ModelSpec {
    pub fn input(&self, name: &str) -> Result<&IoSpec> {
        self.inputs.iter().find(|io| io.name.0 == name).ok_or_else(|| {
            ClassifierError::schema(format!(
                "model has no input named `{name}` (declared: {})",
                names(&self.inputs)
            ))
        })
    }

    pub fn output(&self, name: &str) -> Result<&IoSpec> {
        self.outputs.iter().find(|io| io.name.0 == name).ok_or_else(|| {
            ClassifierError::schema(format!(
                "model has no output named `{name}` (declared: {})",
                names(&self.outputs)
            ))
        })
    }

    /// Fixed leading dimension of input `name`, `None` when it is dynamic.
    pub fn batch_dim(&self, name: &str) -> Result<Option<usize>> {
        match &self.input(name)?.kind {
            ValueKind::Tensor { dims, .. } => Ok(dims.first().copied().flatten()),
            other => Err(ClassifierError::schema(format!(
                "input `{name}` is {other}, expected a tensor"
            ))),
        }
    }

    /// Checks that `name` is a rank-4 float input whose fixed trailing dims
    /// agree with the per-image tensor dims produced by preprocessing.
    pub fn check_image_input(&self, name: &str, image_dims: [usize; 3]) -> Result<()> {
        let input = self.input(name)?;
        let ValueKind::Tensor { dtype, dims } = &input.kind else {
            return Err(ClassifierError::schema(format!(
                "input `{name}` is {}, expected a tensor",
                input.kind
            )));
        };
        if *dtype != DType::F32 {
            return Err(ClassifierError::schema(format!(
                "input `{name}` has element type {dtype}, expected f32"
            )));
        }
        if dims.len() != 4 {
            return Err(ClassifierError::schema(format!(
                "input `{name}` has rank {}, expected 4",
                dims.len()
            )));
        }
        for (declared, wanted) in dims[1..].iter().zip(image_dims) {
            if let Some(declared) = declared {
                if *declared != wanted {
                    return Err(ClassifierError::schema(format!(
                        "input `{name}` is {}, preprocessing produces {image_dims:?}",
                        input.kind
                    )));
                }
            }
        }
        Ok(())
    }
}

fn names(ios: &[IoSpec]) -> String {
    ios.iter()
        .map(|io| io.name.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
