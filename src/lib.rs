#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod config;
pub mod confirm;
pub mod data;
pub mod feed;
pub mod identity;
pub mod session;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
