pub mod error;
pub mod filter;
pub mod llm_config;
pub mod project;
pub mod schema;
