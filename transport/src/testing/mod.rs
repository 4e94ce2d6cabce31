//! In-memory transports for testing.

mod memory;

pub use memory::{ChannelController, ChannelTransport, QueueController, QueueTransport};
