pub mod config;
pub mod event;
pub mod humanize;
pub mod observability;
pub mod pipeline;
pub mod queue;
pub mod server;
pub mod storage;
pub mod thumbnail;
pub mod worker;
