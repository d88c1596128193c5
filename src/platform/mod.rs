//! Collaborators on the chat platform side
//!
//! Storage and messaging are narrow async traits; the dispatcher delivers
//! queue effects to them once the guild lock is released.

pub mod dispatch;
pub mod messenger;
pub mod storage;

pub use dispatch::{DispatchContext, Dispatcher};
pub use messenger::{LoggingMessenger, Messenger, MockMessenger};
pub use storage::{InMemoryQueueStorage, QueueStorage};
