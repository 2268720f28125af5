use crate::{Device, IOName, ModelArtifact, ModelOutputs, ModelSpec, Result, Tensor};

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(&self, artifact: &ModelArtifact, device: Device) -> Result<Self::Model>;
}

/// A loaded, immutable computation graph.
pub trait BackendModel: Send + Sync + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Inputs are already batched along the leading dimension; every output
    /// carries one entry per batch item, in input order.
    fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> Result<ModelOutputs>;
}
