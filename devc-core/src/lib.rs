pub mod error;
pub mod runner;

// Re-export the execution primitives most call sites need.
pub use error::{DevcError, Result};
pub use runner::{
    is_tool_installed, run, run_async, stream, AsyncHandle, CommandResult, RunOpts, StreamHandlers,
    EXIT_CODE_NO_PROCESS,
};
