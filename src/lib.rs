pub mod bootstrap;
pub mod config;
pub mod process;
pub mod store;
pub mod upload;
