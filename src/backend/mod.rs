//! Backend abstraction layer
//!
//! Provides the command trait the renderer drives, the recording backend used for
//! headless testing and the wgpu backend.

pub mod recording;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use recording::{Command, RecordingBackend};
pub use traits::*;
pub use types::*;
