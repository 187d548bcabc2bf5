pub mod config;
pub mod error;
pub mod types;

pub use config::ProspectConfig;
pub use error::{ProspectError, Result};
pub use types::*;
