#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod formats;
pub mod import;
pub mod logging;
pub mod mapper;
pub mod pull;
pub mod store;
pub mod sync;
