//! Interactive client
//!
//! Roster on the left, the open thread on the right with a compose box under
//! it. Terminal input, channel updates, history responses and the typing
//! timer all feed one event loop.

mod app;
mod backend;
mod compose;
mod log_capture;
mod roster;
mod thread;
mod ui;

pub use app::run;
pub use log_capture::LogFeed;
