pub mod dispatcher;
pub mod processed;
pub mod runner;
pub mod stability;
pub mod watcher;
