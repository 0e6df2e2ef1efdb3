pub mod backend;
pub mod config;
pub mod double_buffer;
pub mod emission;
pub mod emitter_path;
pub mod engine;
pub mod error;
pub mod frame_clock;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod host;
pub mod orchestrator;
pub mod record_layout;
pub mod scheduler;
pub mod shader_utils;
pub mod update_stage;

pub use error::{Expected, FountainError, Result};
