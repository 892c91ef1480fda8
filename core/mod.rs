// Core module: request types, error taxonomy and caller-side validation (NO I/O dependencies)
pub mod types;
pub mod config;
pub mod error;
pub mod validate;
pub mod logger;

pub use types::*;
pub use config::*;
pub use error::*;
pub use validate::*;
