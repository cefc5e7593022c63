pub mod config;
pub mod connection;
mod connection_tx_storage;
mod room;
mod room_store;
pub mod server;
