#![allow(clippy::missing_docs_in_private_items)]

pub mod orchestrator;
mod state;

pub use orchestrator::{ChatConfig, ChatOrchestrator, ChatStream};
