//! Client-side messaging core: conversation cache, unread tracking,
//! optimistic sends and the controller that drives them.

pub mod cache;
pub mod clock;
pub mod controller;
pub mod error;
pub mod outbox;
pub mod service;
pub mod unread;

pub use clock::SystemClock;
pub use controller::{Controller, ControllerEvent, ControllerSettings, Phase};
pub use error::{MessagingError, Severity};
pub use service::{MessageService, OutgoingMessage, SendReceipt};
