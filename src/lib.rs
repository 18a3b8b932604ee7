//! rangedown: 可暂停、可断点续传的 Range 下载引擎

pub mod cli;
pub mod config;
pub mod core;
pub mod ui;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
