//! Load once, preprocess every image, run batches in order, decode.
//!
//! There is no per-image isolation: the first failing image, batch or
//! decode aborts the whole run and the error is returned unchanged.

use std::time::{Duration, Instant};

use classport_core::{
    Backend, BackendModel, ClassifierError, Device, ModelArtifact, Result, ScoredResult,
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::batcher::{stack, BatchPolicy};
use crate::config::PipelineConfig;
use crate::decoder::{Decoder, LabelScoreDecoder};
use crate::preprocess::{ImagePreprocessor, Preprocessor};
use crate::ImageRecord;

pub struct Pipeline<M, P, D> {
    model: M,
    preprocessor: P,
    decoder: D,
    input: String,
    policy: BatchPolicy,
    parallel_threshold: usize,
}

impl<M, P, D> Pipeline<M, P, D>
where
    M: BackendModel,
    P: Preprocessor,
    D: Decoder,
{
    /// Binds the stages together, failing with `SchemaMismatch` when the
    /// graph does not declare the requested tensors.
    pub fn new(model: M, preprocessor: P, decoder: D, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;

        let spec = model.spec();
        spec.check_image_input(&config.io.input, preprocessor.tensor_dims())?;
        spec.output(&config.io.label_output)?;
        spec.output(&config.io.score_output)?;
        let policy = BatchPolicy::for_model(config.max_batch, spec, &config.io.input)?;

        Ok(Self {
            model,
            preprocessor,
            decoder,
            input: config.io.input.clone(),
            policy,
            parallel_threshold: config.parallel_threshold,
        })
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// One result per image, in input order.
    pub fn run(&self, images: &[ImageRecord]) -> Result<Vec<ScoredResult>> {
        let tensors = self.preprocess_all(images)?;
        let dims = self.preprocessor.tensor_dims();

        let mut results = Vec::with_capacity(images.len());
        for range in self.policy.plan(images.len()) {
            let records = &images[range.clone()];
            let job = stack(&self.input, dims, range.clone(), &tensors[range])?;
            let batch_size = job.len();
            debug!(start = job.range.start, batch = batch_size, "dispatching batch");

            let outputs = self.model.infer(job.inputs)?;
            let decoded = self.decoder.decode(&outputs, batch_size)?;
            if decoded.len() != batch_size {
                return Err(ClassifierError::OutputShape {
                    output: outputs
                        .names()
                        .map(|n| n.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    expected: batch_size,
                    actual: decoded.len(),
                });
            }

            results.extend(
                decoded
                    .into_iter()
                    .zip(records)
                    .map(|(result, record)| result.with_image(&record.path)),
            );
        }

        Ok(results)
    }

    /// Errors are reported for the first failing image in input order, even
    /// when images are decoded in parallel.
    fn preprocess_all(&self, images: &[ImageRecord]) -> Result<Vec<Vec<f32>>> {
        let tensors: Vec<Result<Vec<f32>>> = if images.len() > self.parallel_threshold {
            images
                .par_iter()
                .map(|record| self.preprocessor.preprocess(record))
                .collect()
        } else {
            images
                .iter()
                .map(|record| self.preprocessor.preprocess(record))
                .collect()
        };
        tensors.into_iter().collect()
    }
}

/// Decoded results plus wall-clock time of model load and scoring.
#[derive(Clone, Debug)]
pub struct ScoreReport {
    pub results: Vec<ScoredResult>,
    pub elapsed: Duration,
}

/// Loads the model once and scores every image in a single pass.
pub fn score<B: Backend>(
    backend: &B,
    artifact: &ModelArtifact,
    device: Device,
    config: &PipelineConfig,
    images: &[ImageRecord],
) -> Result<ScoreReport> {
    let started = Instant::now();

    info!(
        backend = backend.name(),
        model = %artifact.path().display(),
        width = config.preprocess.width,
        height = config.preprocess.height,
        "reading model"
    );
    let preprocessor = ImagePreprocessor::new(config.preprocess.clone())?;
    let decoder = LabelScoreDecoder::new(&config.io);
    let model = backend.load(artifact, device)?;
    let pipeline = Pipeline::new(model, preprocessor, decoder, config)?;

    info!(
        images = images.len(),
        max_batch = pipeline.policy().max_batch,
        "identifying images"
    );
    let results = pipeline.run(images)?;

    let elapsed = started.elapsed();
    info!("Execution time in {} ms", elapsed.as_millis());

    Ok(ScoreReport { results, elapsed })
}
