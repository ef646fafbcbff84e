//! chainlite-core: configuration, data model, error taxonomy and chat protocol
//! shared by the chainlite crates.

pub mod config;
pub mod error;
pub mod model;
pub mod protocol;
pub mod text;

pub use error::{ChainError, Result};
