//! A chat agent that answers through tools, one of which drives a headless
//! browser through job applications.

pub mod actions;
pub mod brain;
pub mod config;
pub mod error;
pub mod face;
pub mod hands;
pub mod history;
pub mod orchestrator;
pub mod process;
pub mod subagent;
pub mod tools;
pub mod types;

#[cfg(test)]
mod testing;
