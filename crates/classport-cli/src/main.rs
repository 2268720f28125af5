mod cli;
mod config;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use classport_backend_ort::OrtBackend;
use classport_core::{Backend, BackendModel, Device, ModelArtifact};
use classport_runtime::{score, ImageRecord};
use cli::{Cli, Command, ScoreArgs};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log).with_context(|| format!("invalid log filter {}", cli.log))?,
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Score(args) => run_score(&args),
        Command::Inspect { model, device } => inspect(model, parse_device(&device)?),
    }
}

fn run_score(args: &ScoreArgs) -> Result<()> {
    let config = AppConfig::resolve(args)?;
    let device = parse_device(&config.device)?;

    let images_dir = config.images_dir();
    info!(images = %images_dir.display(), "images location");
    let images = ImageRecord::list_dir(&images_dir)?;

    let artifact = ModelArtifact::OnnxPath(config.model_path());
    let report = score(
        &OrtBackend::new(),
        &artifact,
        device,
        &config.pipeline,
        &images,
    )?;

    report::write_results(&mut std::io::stdout().lock(), &report.results)?;
    Ok(())
}

fn inspect(model: PathBuf, device: Device) -> Result<()> {
    let backend = OrtBackend::new();
    let loaded = backend.load(&ModelArtifact::OnnxPath(model), device)?;
    report::write_spec(&mut std::io::stdout().lock(), loaded.spec())?;
    Ok(())
}

fn parse_device(raw: &str) -> Result<Device> {
    if raw.eq_ignore_ascii_case("cpu") {
        return Ok(Device::Cpu);
    }

    if let Some(rest) = raw.strip_prefix("cuda:") {
        let device_id: u32 = rest.parse().context("invalid cuda device id")?;
        return Ok(Device::Cuda { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu or cuda:N)");
}
