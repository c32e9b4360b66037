pub mod agent;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod feedback;
pub mod init;
pub mod llm;
pub mod macros;
pub mod memory;
pub mod plan;
pub mod routing;
pub mod server;
pub mod skills;
pub mod utils;

pub use error::Ah32Error;
