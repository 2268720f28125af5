pub mod batcher;
pub mod config;
pub mod decoder;
pub mod pipeline;
pub mod preprocess;
pub mod record;

pub use batcher::*;
pub use config::*;
pub use decoder::*;
pub use pipeline::*;
pub use preprocess::*;
pub use record::*;
