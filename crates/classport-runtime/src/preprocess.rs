//! Image file to model input tensor.

use classport_core::{ClassifierError, Result};
use image::{imageops, DynamicImage, RgbImage};

use crate::config::{ColorOrder, PreprocessConfig, TensorLayout};
use crate::ImageRecord;

pub trait Preprocessor: Send + Sync {
    /// Dims of one image tensor, without the batch dimension.
    fn tensor_dims(&self) -> [usize; 3];

    /// Loads and converts one record into a flat tensor of `tensor_dims` elements.
    fn preprocess(&self, record: &ImageRecord) -> Result<Vec<f32>>;
}

/// Decodes with the `image` crate, stretches to the target size and extracts
/// pixel values in the configured layout and color order.
#[derive(Clone, Debug)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn load(&self, record: &ImageRecord) -> Result<DynamicImage> {
        image::open(&record.path).map_err(|err| ClassifierError::image_load(&record.path, err))
    }

    /// Aspect ratio is not preserved.
    pub fn resize(&self, image: &DynamicImage) -> RgbImage {
        let rgb = image.to_rgb8();
        let (width, height) = (self.config.width, self.config.height);
        if rgb.dimensions() == (width, height) {
            return rgb;
        }
        imageops::resize(&rgb, width, height, self.config.filter.into())
    }

    pub fn extract(&self, image: &RgbImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let plane = width as usize * height as usize;
        let norm = &self.config.normalize;
        let channels: [usize; 3] = match self.config.color {
            ColorOrder::Rgb => [0, 1, 2],
            ColorOrder::Bgr => [2, 1, 0],
        };

        let mut out = vec![0.0f32; plane * 3];
        for (i, pixel) in image.pixels().enumerate() {
            for (c, &src) in channels.iter().enumerate() {
                let value = (pixel.0[src] as f32 * norm.scale - norm.mean[c]) / norm.std[c];
                let idx = match self.config.layout {
                    TensorLayout::Chw => c * plane + i,
                    TensorLayout::Hwc => i * 3 + c,
                };
                out[idx] = value;
            }
        }
        out
    }

    pub fn tensor_from_image(&self, image: &DynamicImage) -> Vec<f32> {
        self.extract(&self.resize(image))
    }
}

impl Preprocessor for ImagePreprocessor {
    fn tensor_dims(&self) -> [usize; 3] {
        self.config.tensor_dims()
    }

    fn preprocess(&self, record: &ImageRecord) -> Result<Vec<f32>> {
        let image = self.load(record)?;
        Ok(self.tensor_from_image(&image))
    }
}
