pub mod artifact;
pub mod backend;
pub mod error;
pub mod output;
pub mod result;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use error::*;
pub use output::*;
pub use result::*;
pub use spec::*;
pub use tensor::*;
