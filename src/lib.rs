#![forbid(unsafe_code)]

pub mod catalog;
pub mod cli;
pub mod collect;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod import;
pub mod logging;
pub mod resolver;
