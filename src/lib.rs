pub mod auth;
pub mod config;
pub mod error;
pub mod password;
pub mod rid;
pub mod server;
pub mod store;
pub mod token;
