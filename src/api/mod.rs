//! REST client for the job-board messaging API

pub mod client;
mod messages;

pub use client::ApiClient;
pub(crate) use messages::decode_message;
