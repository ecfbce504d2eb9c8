//! Model runtime module
//!
//! - Model format validation ([`schema`])
//! - Interpreter, backend and tensor arena ownership ([`runtime`])
//! - Model byte sources ([`loader`])
//! - TensorFlow Lite backend, with the `tflite` feature ([`tflite`])

pub mod loader;
pub mod runtime;
pub mod schema;
#[cfg(feature = "tflite")]
pub mod tflite;

pub use loader::{ChainLoader, FsModelLoader, MemoryModelLoader, ModelLoader};
pub use runtime::{default_backend, Backend, Interpreter, ModelRuntime, TensorArena, UnsupportedBackend};
