pub mod connection;
pub mod endpoints;

pub use connection::{ApiConnectionError, ChatBackend};
pub use endpoints::{ChatMessage, Provider, Sampling};
