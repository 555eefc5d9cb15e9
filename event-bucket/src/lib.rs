pub mod api;
pub mod cli;
pub mod load_config;
pub mod logging;
pub mod storage;

pub use cli::{run, Cli, Commands};
