// ABOUTME: Library side of the caseflow operator binary
// ABOUTME: Store bootstrap, logging setup, and the reconciliation commands it exposes

pub mod commands;
pub mod logging;

#[cfg(test)]
mod tests;

pub use commands::{
    cleanup, dispatcher_options, open_store, read_change, recount, replay, stored_project,
};
