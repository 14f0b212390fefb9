//! Data models for job-board messaging

mod conversation;
mod message;
mod user;

pub use conversation::*;
pub use message::*;
pub use user::*;

#[cfg(test)]
pub(crate) use message::fixtures;
