pub mod api;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod providers;

pub use config::RagConfig;
pub use llm::{Answer, RagChain};
