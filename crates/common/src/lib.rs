//! Building blocks shared by the graphpush server and client.

pub mod queue;

pub use queue::{QueueReceiver, QueueSender, channel};
