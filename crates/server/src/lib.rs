#![forbid(unsafe_code)]

pub mod config;
mod connection;
pub mod dispatch;
pub mod handler;
pub mod server;

pub use config::Config;
pub use connection::Connection;
pub use dispatch::Dispatcher;
pub use handler::handle_connection;
pub use server::{Server, shutdown_signal};
