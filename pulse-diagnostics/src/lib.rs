//! Crash-diagnostic processing for the Pulse agent: payload model, the
//! timestamp-named file store, and the symbolication pipeline that turns
//! stored payloads into crash beacons for the delivery engine.

pub mod payload;
pub mod pipeline;
pub mod stack_trace;
pub mod store;
pub mod symbolicate;

pub use payload::{
    BinaryIdentity, CallStackTree, CrashSession, DiagnosticPayload, DiagnosticThread, Frame,
};
pub use pipeline::SymbolicationPipeline;
pub use stack_trace::{StackBinaryImage, StackFrame, StackHeader, StackThread, StackTrace};
pub use store::DiagnosticStore;
pub use symbolicate::{format_stack_trace, SymbolInfo, SymbolResolver};
