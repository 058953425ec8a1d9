pub mod bootstrap;
pub mod config;
pub mod db;
pub mod llm_clients;
pub mod pdf;
pub mod response;
pub mod security;
