//! Instrumentation helpers: call adapters and the wrappers that drive them.

pub mod adapter;
pub mod wrap;

pub use adapter::{adapter_fn, CallAdapter, FnAdapter, LlmAdapter, ToolAdapter};
pub use wrap::{record_stream, wrap, wrap_async, InstrumentError, RecordedStream};
