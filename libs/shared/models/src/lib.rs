pub mod error;
pub mod tool;

pub use error::*;
pub use tool::*;
