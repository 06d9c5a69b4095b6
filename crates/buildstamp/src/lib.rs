pub mod cache;
pub mod certs;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod tags;

pub use error::{Error, Result};
