//! Data models shared by the client, the relay and the history service

mod event;
mod message;
mod user;

pub use event::*;
pub use message::*;
pub use user::*;
