pub mod channel_routes;
pub mod message_routes;
