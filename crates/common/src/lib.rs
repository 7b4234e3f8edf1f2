//! Small utilities shared by the ebb crates.

pub mod context;
pub mod time;

pub use {context::FromMessage, time::now_ms};
