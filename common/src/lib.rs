pub mod error;
pub mod types;
pub mod strategy;

pub use error::{ShardCtlError, Result};
pub use types::*;
pub use strategy::*;
