use std::ops::Range;

use classport_core::{ClassifierError, IOName, ModelSpec, Result, Shape, Tensor};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPolicy {
    pub max_batch: usize,
}

impl BatchPolicy {
    /// The configured bound, lowered to the fixed leading dim of `input`
    /// when the graph declares one.
    pub fn for_model(max_batch: usize, spec: &ModelSpec, input: &str) -> Result<Self> {
        let bound = match spec.batch_dim(input)? {
            Some(fixed) => max_batch.min(fixed),
            None => max_batch,
        };
        Ok(Self {
            max_batch: bound.max(1),
        })
    }

    /// Consecutive index ranges covering `0..len`, each at most `max_batch` long.
    pub fn plan(&self, len: usize) -> impl Iterator<Item = Range<usize>> {
        let step = self.max_batch.max(1);
        (0..len)
            .step_by(step)
            .map(move |start| start..(start + step).min(len))
    }
}

/// A batch ready to run on the model.
#[derive(Debug)]
pub struct BatchJob {
    pub range: Range<usize>,
    pub inputs: Vec<(IOName, Tensor)>,
}

impl BatchJob {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Stacks per-image tensors along a new leading batch dimension.
pub fn stack(
    input: &str,
    dims: [usize; 3],
    range: Range<usize>,
    images: &[Vec<f32>],
) -> Result<BatchJob> {
    let per_image: usize = dims.iter().product();
    let mut data = Vec::with_capacity(per_image * images.len());
    for (offset, image) in images.iter().enumerate() {
        if image.len() != per_image {
            return Err(ClassifierError::Inference(
                format!(
                    "image {} has {} values, expected {per_image}",
                    range.start + offset,
                    image.len()
                )
                .into(),
            ));
        }
        data.extend_from_slice(image);
    }

    let shape = Shape::from_slice(&[images.len(), dims[0], dims[1], dims[2]]);
    debug!(input, batch = images.len(), shape = %shape, "stacked batch");
    let tensor = Tensor::from_f32(shape, &data)?;

    Ok(BatchJob {
        range,
        inputs: vec![(IOName(input.to_string()), tensor)],
    })
}
