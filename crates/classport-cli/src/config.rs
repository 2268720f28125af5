use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use classport_runtime::PipelineConfig;
use serde::Deserialize;

use crate::cli::ScoreArgs;

/// File settings, overridden by command line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub assets: PathBuf,
    pub model: Option<PathBuf>,
    pub images: Option<PathBuf>,
    pub device: String,
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assets: PathBuf::from("assets"),
            model: None,
            images: None,
            device: "cpu".to_string(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn resolve(args: &ScoreArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(assets) = &args.assets {
            config.assets = assets.clone();
        }
        if let Some(model) = &args.model {
            config.model = Some(model.clone());
        }
        if let Some(images) = &args.images {
            config.images = Some(images.clone());
        }
        if let Some(device) = &args.device {
            config.device = device.clone();
        }
        config.pipeline.validate()?;
        Ok(config)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model
            .clone()
            .unwrap_or_else(|| self.assets.join("Model").join("test.onnx"))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.images
            .clone()
            .unwrap_or_else(|| self.assets.join("images"))
    }
}
