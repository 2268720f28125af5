//! Per-model pipeline configuration.
//!
//! Defaults reproduce the contract of the bundled document classifier: a
//! `data` input of raw 224x224 RGB pixel values in CHW order, a
//! `classLabel` string output and a `loss` sequence-of-maps output.

use classport_core::{ClassifierError, Result};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Tensor names the pipeline binds to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelIo {
    pub input: String,
    pub label_output: String,
    pub score_output: String,
    /// Class vocabulary for graphs that emit raw score tensors or integer
    /// labels. Unused when the graph already reports class names.
    pub classes: Option<Vec<String>>,
}

impl Default for ModelIo {
    fn default() -> Self {
        Self {
            input: "data".to_string(),
            label_output: "classLabel".to_string(),
            score_output: "loss".to_string(),
            classes: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Memory layout of one image tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    #[default]
    Chw,
    Hwc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Bgr,
}

/// `value = (pixel * scale - mean[c]) / std[c]`.
///
/// The identity default keeps raw 0..=255 intensities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Normalization {
    pub scale: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            scale: 1.0,
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }
}

impl Normalization {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ClassifierError::config(format!(
                "normalize.scale must be a positive finite number, got {}",
                self.scale
            )));
        }
        for (i, m) in self.mean.iter().enumerate() {
            if !m.is_finite() {
                return Err(ClassifierError::config(format!(
                    "normalize.mean[{i}] is not finite: {m}"
                )));
            }
        }
        for (i, s) in self.std.iter().enumerate() {
            if !(s.is_finite() && *s > 0.0) {
                return Err(ClassifierError::config(format!(
                    "normalize.std[{i}] must be a positive finite number, got {s}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    pub filter: ResizeFilter,
    pub layout: TensorLayout,
    pub color: ColorOrder,
    pub normalize: Normalization,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 224,
            height: 224,
            filter: ResizeFilter::default(),
            layout: TensorLayout::default(),
            color: ColorOrder::default(),
            normalize: Normalization::default(),
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ClassifierError::config(format!(
                "preprocess size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        self.normalize.validate()
    }

    /// Per-image tensor dims in the configured layout.
    pub fn tensor_dims(&self) -> [usize; 3] {
        let (w, h) = (self.width as usize, self.height as usize);
        match self.layout {
            TensorLayout::Chw => [3, h, w],
            TensorLayout::Hwc => [h, w, 3],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub io: ModelIo,
    pub preprocess: PreprocessConfig,
    /// Upper bound on images per inference call; the model may lower it.
    pub max_batch: usize,
    /// Preprocess in parallel once a collection is larger than this.
    pub parallel_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            io: ModelIo::default(),
            preprocess: PreprocessConfig::default(),
            max_batch: 32,
            parallel_threshold: 8,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 {
            return Err(ClassifierError::config("max_batch must be at least 1"));
        }
        self.preprocess.validate()
    }
}
