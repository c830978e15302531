//! daz-command: a tool server for coding agents that records every action
//! as an event and folds the events into a per-session knowledge base in
//! the background.

pub mod config;
pub mod event;
pub mod history;
pub mod logging;
pub mod mcp;
pub mod model;
pub mod session;
pub mod state;
pub mod storage;
pub mod summary;
pub mod tool;
