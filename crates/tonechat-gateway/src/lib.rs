pub mod connection;
pub mod registry;

pub use registry::{Broadcaster, ConnectionId, ConversationKey, GroupKey, GroupRegistry};
