mod message;

pub use message::{DoneMessage, Message, MessageClass, WorkMessage};
