//! Side-effecting adapters: configuration, child processes, completion
//! backends, prompts, source materialization and record persistence.

pub mod completion;
pub mod config;
pub mod openai;
pub mod process;
pub mod prompt;
pub mod record_store;
pub mod source;
pub mod workspace;
