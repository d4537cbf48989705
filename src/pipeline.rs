//! Pipeline subsystem
//!
//! The sequential capture -> classify -> persist loop and the JSON-lines
//! event stream it feeds.

pub mod capture_pipeline;
pub mod emitter;

pub use capture_pipeline::CapturePipeline;
pub use emitter::EventEmitter;
