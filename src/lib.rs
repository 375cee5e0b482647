#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod bridge;
pub mod config;
pub mod data;
pub mod format;
pub mod poller;
pub mod sign;
pub mod storage;
pub mod stream;
pub mod subscription;
pub mod text;
pub mod tracker;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
