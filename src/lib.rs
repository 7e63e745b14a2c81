pub mod cli;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod watch;
