//! Stable exit codes for codegen CLI commands.

/// Command succeeded, or the loop finished before exhausting its budget.
pub const OK: i32 = 0;
/// Invalid input or config, or a fatal error during the run.
pub const INVALID: i32 = 1;
/// `codegen run` stopped because the planning budget was exceeded.
pub const EXHAUSTED: i32 = 2;
