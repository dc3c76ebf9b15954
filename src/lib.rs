pub mod db;
pub mod events;
pub mod server;
pub mod version;
pub mod web;
pub mod webhooks;
pub mod websocket_models;
pub mod ws;
