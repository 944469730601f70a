//! Route handler modules for the sociable-web REST API.

pub mod account;
pub mod chats;
pub mod complaints;
pub mod health;
pub mod profiles;
pub mod websocket;
