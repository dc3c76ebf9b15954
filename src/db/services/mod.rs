//! High-level data access over the `channels` and `messages` tables.
//! Encapsulates all SQL so the delivery core and the HTTP handlers work with
//! domain models without knowing the schema.

pub mod channel_service;
pub mod message_service;

pub use channel_service::{
    ChannelError, ChannelService, CreateChannelInput, UpdateChannelInput, check_permission,
};
pub use message_service::{ChannelMessageStats, MessageFilter, MessageService, MessageStats};
