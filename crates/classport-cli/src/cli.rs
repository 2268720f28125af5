use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "classport",
    version,
    about = "Score a directory of images with an ONNX classification model"
)]
pub struct Cli {
    /// Log filter (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score every image in a directory and print the predictions
    Score(ScoreArgs),

    /// Print the inputs and outputs a model declares
    Inspect {
        /// Path to ONNX model file
        #[arg(long)]
        model: PathBuf,

        /// Device for inference (cpu or cuda:N)
        #[arg(long, default_value = "cpu")]
        device: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct ScoreArgs {
    /// TOML file with model and preprocessing settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root of the bundled assets
    #[arg(long)]
    pub assets: Option<PathBuf>,

    /// Path to ONNX model file [default: <assets>/Model/test.onnx]
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Directory of images to score [default: <assets>/images]
    #[arg(long)]
    pub images: Option<PathBuf>,

    /// Device for inference (cpu or cuda:N)
    #[arg(long)]
    pub device: Option<String>,
}
