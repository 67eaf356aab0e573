pub mod api_connection;
pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod profile;
pub mod relay;
pub mod server;
pub mod storage;
