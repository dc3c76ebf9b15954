pub mod enums;
pub mod models;
pub mod schema;
pub mod services;
