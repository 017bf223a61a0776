// flowbench-sdk: Foundation layer for the flowbench execution core.
// This crate has ZERO dependencies on other flowbench crates and provides
// the trace abstraction and the shell invocation primitive used by
// step workers.

pub mod shell_invoker;
pub mod trace;

// Re-export commonly used items at crate root
pub use shell_invoker::{CommandOutput, ShellInvoker};
pub use trace::{
    CollectingTraceWriter, NullTraceWriter, TraceLevel, TraceWriter, TracingTraceWriter,
};
