//! Bundled sink implementations

pub mod file;
pub mod rotating_file;

pub use file::{FileSink, DEFAULT_BUFFER_SIZE};
pub use rotating_file::{RotatingFileSink, RotationPolicy, RotationTrigger};
