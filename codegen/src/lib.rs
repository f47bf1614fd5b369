//! Iterative plan → generate → review code generation.
//!
//! Given a repository reference and a natural-language request, the
//! orchestrator materializes the repository into a scratch workspace and
//! loops: a planner reviews the latest diff and plans more steps, a worker
//! turns chunks of the planned files into diff fragments, until the review is
//! accepted, nothing is left to do, or the attempt budget runs out.
//!
//! - **[`core`]**: Pure, deterministic logic (types, chunking, fingerprints,
//!   loop decisions). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, processes, completion
//!   backends, prompts, workspace, record store).
//! - **[`agents`]**: Planner and worker on top of a completion backend.
//!
//! [`orchestrator`] runs the loop; [`service`] runs it and persists the outcome.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
