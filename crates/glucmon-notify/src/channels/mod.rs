pub mod chat;
pub mod discord;
pub mod memory;
