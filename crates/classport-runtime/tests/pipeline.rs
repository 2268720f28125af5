use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use classport_core::{
    Backend, BackendModel, ClassifierError, DType, Device, IOName, IoSpec, ModelArtifact,
    ModelOutputs, ModelSpec, OutputValue, Shape, Tensor, ValueKind,
};
use classport_runtime::{
    score, ImagePreprocessor, ImageRecord, LabelScoreDecoder, Pipeline, PipelineConfig,
    PreprocessConfig, Preprocessor,
};
use image::{Rgb, RgbImage};

/// Labels each image "bright" or "dark" from its mean intensity.
#[derive(Clone)]
struct BrightnessBackend {
    input: &'static str,
    batch_dim: Option<usize>,
    batches: Arc<Mutex<Vec<usize>>>,
}

impl BrightnessBackend {
    fn new() -> Self {
        Self {
            input: "data",
            batch_dim: None,
            batches: Arc::default(),
        }
    }

    fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

struct BrightnessModel {
    spec: ModelSpec,
    batches: Arc<Mutex<Vec<usize>>>,
}

impl Backend for BrightnessBackend {
    type Model = BrightnessModel;

    fn name(&self) -> &'static str {
        "brightness"
    }

    fn load(&self, artifact: &ModelArtifact, _device: Device) -> classport_core::Result<Self::Model> {
        if !artifact.path().ends_with("brightness.onnx") {
            return Err(ClassifierError::model_load(artifact.path(), "no such model"));
        }
        Ok(BrightnessModel {
            spec: ModelSpec {
                inputs: vec![IoSpec {
                    name: self.input.into(),
                    kind: ValueKind::Tensor {
                        dtype: DType::F32,
                        dims: vec![self.batch_dim, Some(3), Some(8), Some(8)],
                    },
                }],
                outputs: vec![
                    IoSpec {
                        name: "classLabel".into(),
                        kind: ValueKind::Tensor {
                            dtype: DType::String,
                            dims: vec![None],
                        },
                    },
                    IoSpec {
                        name: "loss".into(),
                        kind: ValueKind::SequenceOfMaps {
                            key: DType::String,
                            value: DType::F32,
                        },
                    },
                ],
            },
            batches: self.batches.clone(),
        })
    }
}

impl BackendModel for BrightnessModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&self, inputs: Vec<(IOName, Tensor)>) -> classport_core::Result<ModelOutputs> {
        let (_, tensor) = &inputs[0];
        let batch = tensor.shape.leading();
        self.batches.lock().unwrap().push(batch);

        let values = tensor.to_f32_vec()?;
        let per_image = values.len() / batch;
        let mut labels = Vec::with_capacity(batch);
        let mut scores = Vec::with_capacity(batch);
        for image in values.chunks(per_image) {
            let bright = image.iter().sum::<f32>() / (per_image as f32 * 255.0);
            labels.push(if bright >= 0.5 { "bright" } else { "dark" }.to_string());
            scores.push(BTreeMap::from([
                ("bright".to_string(), bright),
                ("dark".to_string(), 1.0 - bright),
            ]));
        }

        Ok(ModelOutputs::new()
            .with(
                "classLabel",
                OutputValue::Strings {
                    shape: Shape::from_slice(&[batch]),
                    values: labels,
                },
            )
            .with("loss", OutputValue::MapSequence(scores)))
    }
}

/// Counts how many records reach preprocessing.
struct CountingPreprocessor {
    inner: ImagePreprocessor,
    calls: Arc<AtomicUsize>,
}

impl CountingPreprocessor {
    fn new(calls: Arc<AtomicUsize>) -> Result<Self> {
        Ok(Self {
            inner: ImagePreprocessor::new(config().preprocess)?,
            calls,
        })
    }
}

impl Preprocessor for CountingPreprocessor {
    fn tensor_dims(&self) -> [usize; 3] {
        self.inner.tensor_dims()
    }

    fn preprocess(&self, record: &ImageRecord) -> classport_core::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.preprocess(record)
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        preprocess: PreprocessConfig {
            width: 8,
            height: 8,
            ..PreprocessConfig::default()
        },
        ..PipelineConfig::default()
    }
}

fn artifact() -> ModelArtifact {
    ModelArtifact::OnnxPath(PathBuf::from("models/brightness.onnx"))
}

fn write_gray(dir: &Path, name: &str, level: u8) -> Result<ImageRecord> {
    let path = dir.join(name);
    RgbImage::from_pixel(20, 12, Rgb([level, level, level])).save(&path)?;
    Ok(ImageRecord::new(path).with_label(name))
}

#[test]
fn one_result_per_image_in_input_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let levels = [250u8, 10, 200, 30, 128];
    let images = levels
        .iter()
        .enumerate()
        .map(|(i, level)| write_gray(dir.path(), &format!("img{i}.png"), *level))
        .collect::<Result<Vec<_>>>()?;

    let backend = BrightnessBackend::new();
    let config = PipelineConfig {
        max_batch: 2,
        ..config()
    };
    let report = score(&backend, &artifact(), Device::Cpu, &config, &images)?;

    assert_eq!(backend.batches(), vec![2, 2, 1]);
    assert_eq!(report.results.len(), images.len());
    let labels: Vec<_> = report
        .results
        .iter()
        .map(|r| r.predicted_labels.join(","))
        .collect();
    assert_eq!(labels, ["bright", "dark", "bright", "dark", "bright"]);
    for (result, record) in report.results.iter().zip(&images) {
        assert_eq!(result.image.as_deref(), Some(record.path.as_path()));
        assert_eq!(result.class_scores.len(), 1);
    }
    let bright = report.results[0].class_scores[0].get("bright").unwrap();
    assert!((bright - 250.0 / 255.0).abs() < 1e-4);
    Ok(())
}

#[test]
fn repeated_scoring_is_deterministic() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let images = vec![
        write_gray(dir.path(), "a.png", 90)?,
        write_gray(dir.path(), "b.png", 170)?,
    ];

    let backend = BrightnessBackend::new();
    let first = score(&backend, &artifact(), Device::Cpu, &config(), &images)?;
    let second = score(&backend, &artifact(), Device::Cpu, &config(), &images)?;

    assert_eq!(first.results, second.results);
    Ok(())
}

#[test]
fn parallel_preprocessing_keeps_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let images = (0..12u8)
        .map(|i| write_gray(dir.path(), &format!("{i:02}.png"), if i % 3 == 0 { 240 } else { 20 }))
        .collect::<Result<Vec<_>>>()?;

    let config = PipelineConfig {
        parallel_threshold: 2,
        ..config()
    };
    let report = score(&BrightnessBackend::new(), &artifact(), Device::Cpu, &config, &images)?;

    for (i, result) in report.results.iter().enumerate() {
        let expected = if i % 3 == 0 { "bright" } else { "dark" };
        assert_eq!(result.predicted_labels, vec![expected], "image {i}");
    }
    Ok(())
}

#[test]
fn fixed_batch_model_runs_one_image_per_call() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let images = vec![
        write_gray(dir.path(), "a.png", 1)?,
        write_gray(dir.path(), "b.png", 2)?,
        write_gray(dir.path(), "c.png", 3)?,
    ];

    let backend = BrightnessBackend {
        batch_dim: Some(1),
        ..BrightnessBackend::new()
    };
    let report = score(&backend, &artifact(), Device::Cpu, &config(), &images)?;

    assert_eq!(backend.batches(), vec![1, 1, 1]);
    assert_eq!(report.results.len(), 3);
    Ok(())
}

#[test]
fn input_name_mismatch_fails_before_any_image_is_read() -> Result<()> {
    let backend = BrightnessBackend {
        input: "input",
        ..BrightnessBackend::new()
    };
    let calls = Arc::new(AtomicUsize::new(0));
    let model = backend.load(&artifact(), Device::Cpu)?;

    let result = Pipeline::new(
        model,
        CountingPreprocessor::new(calls.clone())?,
        LabelScoreDecoder::new(&config().io),
        &config(),
    );
    match result {
        Err(ClassifierError::SchemaMismatch { message }) => assert!(message.contains("`data`")),
        Err(other) => panic!("expected SchemaMismatch, got {other:?}"),
        Ok(_) => panic!("expected SchemaMismatch"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Through the orchestrator the same mismatch wins over unreadable images.
    let images = vec![ImageRecord::new("/missing/one.png")];
    let err = score(&backend, &artifact(), Device::Cpu, &config(), &images).unwrap_err();
    assert!(matches!(err, ClassifierError::SchemaMismatch { .. }));
    assert!(backend.batches().is_empty());
    Ok(())
}

#[test]
fn corrupt_image_aborts_the_whole_batch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let corrupt = dir.path().join("2-corrupt.png");
    std::fs::write(&corrupt, b"\x89PNG truncated")?;
    let images = vec![
        write_gray(dir.path(), "1-ok.png", 200)?,
        ImageRecord::new(&corrupt),
        write_gray(dir.path(), "3-ok.png", 20)?,
    ];

    let backend = BrightnessBackend::new();
    let model = backend.load(&artifact(), Device::Cpu)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new(
        model,
        CountingPreprocessor::new(calls.clone())?,
        LabelScoreDecoder::new(&config().io),
        &config(),
    )?;

    match pipeline.run(&images) {
        Err(ClassifierError::ImageLoad { path, .. }) => assert_eq!(path, corrupt),
        Err(other) => panic!("expected ImageLoad, got {other:?}"),
        Ok(results) => panic!("expected failure, got {} results", results.len()),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(backend.batches().is_empty(), "no inference after a failed image");
    Ok(())
}

#[test]
fn empty_collection_scores_nothing() -> Result<()> {
    let backend = BrightnessBackend::new();
    let report = score(&backend, &artifact(), Device::Cpu, &config(), &[])?;

    assert!(report.results.is_empty());
    assert!(backend.batches().is_empty());
    Ok(())
}

#[test]
fn model_load_error_is_propagated() {
    let missing = ModelArtifact::OnnxPath(PathBuf::from("models/absent.onnx"));
    let err = score(&BrightnessBackend::new(), &missing, Device::Cpu, &config(), &[]).unwrap_err();
    assert!(matches!(err, ClassifierError::ModelLoad { .. }));
}

#[test]
fn mismatched_spatial_dims_are_schema_errors() {
    let config = PipelineConfig::default();
    let err = score(&BrightnessBackend::new(), &artifact(), Device::Cpu, &config, &[]).unwrap_err();
    assert!(matches!(err, ClassifierError::SchemaMismatch { .. }));
}
