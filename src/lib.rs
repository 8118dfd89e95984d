pub mod audit;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod init;
pub mod logging;
pub mod migrate_config;
pub mod migration;
pub mod state;
pub mod ui;
