// Library exports for Snapgram
// This allows integration tests and the CLI binary to use the client modules

pub mod backend;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod interactions;
pub mod session;
