//! # Vigil Core
//!
//! Configuration model and error types shared by the Vigil crates.

pub mod config;
pub mod error;

pub use config::{HeartbeatConfig, PipelineConfig, SchedulerConfig, VigilConfig};
pub use error::{Result, VigilError};
