pub mod models;
pub mod snapshot;
pub mod trace;

pub use models::*;
pub use trace::*;
