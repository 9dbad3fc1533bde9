pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod practicum;
pub mod response;
pub mod status;
pub mod telegram;
